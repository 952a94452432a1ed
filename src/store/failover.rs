//! Failure-policy wrapper over the external store.
//!
//! In permissive mode an unreachable external store downgrades to the
//! in-memory backend (writes land there, reads of external-only keys come
//! back empty). In strict mode failures surface as `StoreUnavailable`.
//! Keys written to the fallback are not migrated back once the external
//! store recovers.

use super::{KvStore, MemoryStore};
use crate::errors::{CoreError, CoreResult};
use crate::models::StoreMode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct FailoverStore {
    primary: Option<Arc<dyn KvStore>>,
    fallback: MemoryStore,
    mode: StoreMode,
}

impl FailoverStore {
    pub fn new(primary: Option<Arc<dyn KvStore>>, mode: StoreMode) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            mode,
        }
    }

    /// In-memory only; what tests and store-less deployments run against.
    pub fn memory_only() -> Self {
        Self::new(None, StoreMode::Permissive)
    }

    /// Decide what to do with a primary failure: strict surfaces it,
    /// permissive logs and lets the caller fall through to memory.
    fn note_failure(&self, op: &str, key: &str, err: CoreError) -> CoreResult<()> {
        match self.mode {
            StoreMode::Strict => Err(err),
            StoreMode::Permissive => {
                warn!(op, key, error = %err, "store unavailable; serving from memory");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl KvStore for FailoverStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(v) => return Ok(v),
                Err(e) => self.note_failure("get", key, e)?,
            }
        }
        self.fallback.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.set(key, value).await {
                Ok(()) => return Ok(()),
                Err(e) => self.note_failure("set", key, e)?,
            }
        }
        self.fallback.set(key, value).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.set_ex(key, value, ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => self.note_failure("set_ex", key, e)?,
            }
        }
        self.fallback.set_ex(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.del(key).await {
                Ok(()) => return self.fallback.del(key).await,
                Err(e) => self.note_failure("del", key, e)?,
            }
        }
        self.fallback.del(key).await
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        if let Some(primary) = &self.primary {
            match primary.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => self.note_failure("exists", key, e)?,
            }
        }
        self.fallback.exists(key).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.hset(key, field, value).await {
                Ok(()) => return Ok(()),
                Err(e) => self.note_failure("hset", key, e)?,
            }
        }
        self.fallback.hset(key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> CoreResult<Option<String>> {
        if let Some(primary) = &self.primary {
            match primary.hget(key, field).await {
                Ok(v) => return Ok(v),
                Err(e) => self.note_failure("hget", key, e)?,
            }
        }
        self.fallback.hget(key, field).await
    }

    async fn hget_all(&self, key: &str) -> CoreResult<Vec<(String, String)>> {
        if let Some(primary) = &self.primary {
            match primary.hget_all(key).await {
                Ok(v) => return Ok(v),
                Err(e) => self.note_failure("hget_all", key, e)?,
            }
        }
        self.fallback.hget_all(key).await
    }

    async fn hlen(&self, key: &str) -> CoreResult<usize> {
        if let Some(primary) = &self.primary {
            match primary.hlen(key).await {
                Ok(v) => return Ok(v),
                Err(e) => self.note_failure("hlen", key, e)?,
            }
        }
        self.fallback.hlen(key).await
    }

    async fn sadd(&self, key: &str, member: &str) -> CoreResult<bool> {
        if let Some(primary) = &self.primary {
            match primary.sadd(key, member).await {
                Ok(v) => return Ok(v),
                Err(e) => self.note_failure("sadd", key, e)?,
            }
        }
        self.fallback.sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.srem(key, member).await {
                Ok(()) => return self.fallback.srem(key, member).await,
                Err(e) => self.note_failure("srem", key, e)?,
            }
        }
        self.fallback.srem(key, member).await
    }

    async fn smembers(&self, key: &str) -> CoreResult<Vec<String>> {
        if let Some(primary) = &self.primary {
            match primary.smembers(key).await {
                Ok(v) if !v.is_empty() => return Ok(v),
                Ok(_) => {}
                Err(e) => self.note_failure("smembers", key, e)?,
            }
        }
        self.fallback.smembers(key).await
    }

    async fn sismember(&self, key: &str, member: &str) -> CoreResult<bool> {
        if let Some(primary) = &self.primary {
            match primary.sismember(key, member).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => self.note_failure("sismember", key, e)?,
            }
        }
        self.fallback.sismember(key, member).await
    }

    async fn scard(&self, key: &str) -> CoreResult<usize> {
        if let Some(primary) = &self.primary {
            match primary.scard(key).await {
                Ok(v) if v > 0 => return Ok(v),
                Ok(_) => {}
                Err(e) => self.note_failure("scard", key, e)?,
            }
        }
        self.fallback.scard(key).await
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.zadd(key, score, member).await {
                Ok(()) => return Ok(()),
                Err(e) => self.note_failure("zadd", key, e)?,
            }
        }
        self.fallback.zadd(key, score, member).await
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> CoreResult<Vec<(String, f64)>> {
        if let Some(primary) = &self.primary {
            match primary.zrevrange_withscores(key, start, stop).await {
                Ok(v) if !v.is_empty() => return Ok(v),
                Ok(_) => {}
                Err(e) => self.note_failure("zrevrange", key, e)?,
            }
        }
        self.fallback.zrevrange_withscores(key, start, stop).await
    }

    async fn zrem(&self, key: &str, member: &str) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.zrem(key, member).await {
                Ok(()) => return self.fallback.zrem(key, member).await,
                Err(e) => self.note_failure("zrem", key, e)?,
            }
        }
        self.fallback.zrem(key, member).await
    }

    async fn incr(&self, key: &str) -> CoreResult<i64> {
        if let Some(primary) = &self.primary {
            match primary.incr(key).await {
                Ok(v) => return Ok(v),
                Err(e) => self.note_failure("incr", key, e)?,
            }
        }
        self.fallback.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CoreResult<()> {
        if let Some(primary) = &self.primary {
            match primary.expire(key, ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => self.note_failure("expire", key, e)?,
            }
        }
        self.fallback.expire(key, ttl).await
    }

    async fn keys(&self, pattern: &str) -> CoreResult<Vec<String>> {
        let mut out = Vec::new();
        if let Some(primary) = &self.primary {
            match primary.keys(pattern).await {
                Ok(v) => out = v,
                Err(e) => self.note_failure("keys", pattern, e)?,
            }
        }
        // Union with fallback keys so permissive-mode writes stay visible.
        for key in self.fallback.keys(pattern).await? {
            if !out.contains(&key) {
                out.push(key);
            }
        }
        Ok(out)
    }
}
