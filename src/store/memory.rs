//! In-memory [`KvStore`] backend.
//!
//! Keeps separate maps per data shape (string, hash, set, sorted set) plus
//! one counter map, all behind a single mutex. `set_ex` schedules a delayed
//! delete; a generation counter per key invalidates stale expiries when the
//! key is written again before the timer fires.

use super::{pattern_matches, KvStore};
use crate::errors::CoreResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    counters: HashMap<String, i64>,
    // Bumped on every write to a key; an expiry only fires if the
    // generation it captured is still current.
    generations: HashMap<String, u64>,
}

impl Inner {
    fn remove_key(&mut self, key: &str) {
        self.strings.remove(key);
        self.hashes.remove(key);
        self.sets.remove(key);
        self.zsets.remove(key);
        self.counters.remove(key);
    }

    fn bump(&mut self, key: &str) -> u64 {
        let g = self.generations.entry(key.to_string()).or_insert(0);
        *g += 1;
        *g
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn schedule_expiry(&self, key: &str, ttl: Duration, generation: u64) {
        let inner = self.inner.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut guard = inner.lock();
            if guard.generations.get(&key).copied() == Some(generation) {
                guard.remove_key(&key);
            }
        });
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.inner.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.bump(key);
        inner.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        let generation = {
            let mut inner = self.inner.lock();
            inner.strings.insert(key.to_string(), value.to_string());
            inner.bump(key)
        };
        self.schedule_expiry(key, ttl, generation);
        Ok(())
    }

    async fn del(&self, key: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.bump(key);
        inner.remove_key(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        let inner = self.inner.lock();
        Ok(inner.strings.contains_key(key)
            || inner.hashes.contains_key(key)
            || inner.sets.contains_key(key)
            || inner.zsets.contains_key(key)
            || inner.counters.contains_key(key))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.bump(key);
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> CoreResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hget_all(&self, key: &str) -> CoreResult<Vec<(String, String)>> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> CoreResult<usize> {
        Ok(self.inner.lock().hashes.get(key).map_or(0, |h| h.len()))
    }

    async fn sadd(&self, key: &str, member: &str) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.bump(key);
        Ok(inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> CoreResult<()> {
        if let Some(set) = self.inner.lock().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> CoreResult<bool> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .is_some_and(|s| s.contains(member)))
    }

    async fn scard(&self, key: &str) -> CoreResult<usize> {
        Ok(self.inner.lock().sets.get(key).map_or(0, |s| s.len()))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.bump(key);
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> CoreResult<Vec<(String, f64)>> {
        let mut entries: Vec<(String, f64)> = self
            .inner
            .lock()
            .zsets
            .get(key)
            .map(|z| z.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();

        // Score descending, member ascending as the tiebreak so ranks are
        // deterministic.
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let len = entries.len() as isize;
        let start = start.max(0);
        let stop = if stop < 0 { len + stop } else { stop };
        if start >= len || stop < start {
            return Ok(Vec::new());
        }
        let stop = stop.min(len - 1);

        Ok(entries[start as usize..=stop as usize].to_vec())
    }

    async fn zrem(&self, key: &str, member: &str) -> CoreResult<()> {
        if let Some(zset) = self.inner.lock().zsets.get_mut(key) {
            zset.remove(member);
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> CoreResult<i64> {
        let mut inner = self.inner.lock();
        let counter = inner.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CoreResult<()> {
        let generation = self.inner.lock().bump(key);
        self.schedule_expiry(key, ttl, generation);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CoreResult<Vec<String>> {
        let inner = self.inner.lock();
        let mut out: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.hashes.keys())
            .chain(inner.sets.keys())
            .chain(inner.zsets.keys())
            .chain(inner.counters.keys())
            .filter(|k| pattern_matches(pattern, k))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }
}
