//! Redis-backed [`KvStore`].

use super::KvStore;
use crate::errors::{CoreError, CoreResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and ping; fails fast when the server is unreachable so the
    /// caller can decide between strict failure and the in-memory fallback.
    pub async fn connect(url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let mut conn = ConnectionManager::new(client).await.map_err(store_err)?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(store_err)?;
        info!("connected to redis");
        Ok(Self { conn })
    }
}

fn store_err(err: redis::RedisError) -> CoreError {
    CoreError::StoreUnavailable(err.to_string())
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        self.conn.clone().get(key).await.map_err(store_err)
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.conn.clone().set(key, value).await.map_err(store_err)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        self.conn
            .clone()
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(store_err)
    }

    async fn del(&self, key: &str) -> CoreResult<()> {
        self.conn.clone().del(key).await.map_err(store_err)
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        self.conn.clone().exists(key).await.map_err(store_err)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> CoreResult<()> {
        self.conn
            .clone()
            .hset(key, field, value)
            .await
            .map_err(store_err)
    }

    async fn hget(&self, key: &str, field: &str) -> CoreResult<Option<String>> {
        self.conn.clone().hget(key, field).await.map_err(store_err)
    }

    async fn hget_all(&self, key: &str) -> CoreResult<Vec<(String, String)>> {
        self.conn.clone().hgetall(key).await.map_err(store_err)
    }

    async fn hlen(&self, key: &str) -> CoreResult<usize> {
        self.conn.clone().hlen(key).await.map_err(store_err)
    }

    async fn sadd(&self, key: &str, member: &str) -> CoreResult<bool> {
        let added: i64 = self
            .conn
            .clone()
            .sadd(key, member)
            .await
            .map_err(store_err)?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> CoreResult<()> {
        self.conn.clone().srem(key, member).await.map_err(store_err)
    }

    async fn smembers(&self, key: &str) -> CoreResult<Vec<String>> {
        self.conn.clone().smembers(key).await.map_err(store_err)
    }

    async fn sismember(&self, key: &str, member: &str) -> CoreResult<bool> {
        self.conn
            .clone()
            .sismember(key, member)
            .await
            .map_err(store_err)
    }

    async fn scard(&self, key: &str) -> CoreResult<usize> {
        self.conn.clone().scard(key).await.map_err(store_err)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> CoreResult<()> {
        self.conn
            .clone()
            .zadd(key, member, score)
            .await
            .map_err(store_err)
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> CoreResult<Vec<(String, f64)>> {
        self.conn
            .clone()
            .zrevrange_withscores(key, start, stop)
            .await
            .map_err(store_err)
    }

    async fn zrem(&self, key: &str, member: &str) -> CoreResult<()> {
        self.conn.clone().zrem(key, member).await.map_err(store_err)
    }

    async fn incr(&self, key: &str) -> CoreResult<i64> {
        self.conn.clone().incr(key, 1).await.map_err(store_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CoreResult<()> {
        self.conn
            .clone()
            .expire(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(store_err)
    }

    async fn keys(&self, pattern: &str) -> CoreResult<Vec<String>> {
        self.conn.clone().keys(pattern).await.map_err(store_err)
    }
}
