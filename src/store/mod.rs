//! Keyed storage behind one small contract.
//!
//! Two backends implement [`KvStore`]: Redis ([`RedisStore`]) and an
//! in-memory store ([`MemoryStore`]) used for tests and as the permissive
//! fallback when Redis is down. [`FailoverStore`] wraps the two and applies
//! the configured failure policy.

mod failover;
mod memory;
mod redis_store;

pub use failover::FailoverStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::errors::CoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// Unified key-value contract: strings, hashes, sets, sorted sets,
/// counters, TTL, pattern scan.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> CoreResult<()>;
    /// `set` with a TTL; the key is deleted once the TTL elapses.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()>;
    async fn del(&self, key: &str) -> CoreResult<()>;
    async fn exists(&self, key: &str) -> CoreResult<bool>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> CoreResult<()>;
    async fn hget(&self, key: &str, field: &str) -> CoreResult<Option<String>>;
    async fn hget_all(&self, key: &str) -> CoreResult<Vec<(String, String)>>;
    async fn hlen(&self, key: &str) -> CoreResult<usize>;

    /// Returns true when the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> CoreResult<bool>;
    async fn srem(&self, key: &str, member: &str) -> CoreResult<()>;
    async fn smembers(&self, key: &str) -> CoreResult<Vec<String>>;
    async fn sismember(&self, key: &str, member: &str) -> CoreResult<bool>;
    async fn scard(&self, key: &str) -> CoreResult<usize>;

    async fn zadd(&self, key: &str, score: f64, member: &str) -> CoreResult<()>;
    /// Members with scores, highest score first, sliced by rank
    /// (`start..=stop`, both zero-based; `stop = -1` means "to the end").
    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> CoreResult<Vec<(String, f64)>>;
    async fn zrem(&self, key: &str, member: &str) -> CoreResult<()>;

    /// Atomic counter increment; returns the post-increment value.
    async fn incr(&self, key: &str) -> CoreResult<i64>;
    async fn expire(&self, key: &str, ttl: Duration) -> CoreResult<()>;
    /// Keys matching a glob pattern (only `prefix*` patterns are used here).
    async fn keys(&self, pattern: &str) -> CoreResult<Vec<String>>;
}

/// Glob match limited to the `prefix*` / exact forms the key layout uses.
pub(crate) fn pattern_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}
