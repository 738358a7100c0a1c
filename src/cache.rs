//! Two-backend key/value cache (§3 invariant iv, §9 design note).
//!
//! The shared backend (Redis) is authoritative. The in-process backend
//! (`DashMap`) is a fallback used only when `REDIS_URL` is not configured;
//! the behavioral profiler (§4.6) requires the shared backend and degrades
//! to a no-op when it isn't available — that degradation is surfaced by
//! `/health`, never silently swallowed elsewhere.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Option<String>;
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;

    /// Push `value` onto the front of the list at `key`, trim it to `max_len`,
    /// and refresh its expiry — the profiler's bounded path history (§4.6).
    /// The three steps SHOULD commit atomically; callers must tolerate a
    /// transient window where the list is trimmed but the expiry has not
    /// yet been refreshed (§5).
    async fn list_push_trim_expire(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        ttl: Duration,
    ) -> anyhow::Result<Vec<String>>;

    /// Increment a counter bucketed by a fixed window, returning the new
    /// sliding-window set of timestamps still within `window`. Used by the
    /// anomaly counters (§4.8).
    async fn record_and_count(&self, key: &str, window: Duration) -> anyhow::Result<u64>;

    /// True when this cache is backed by a shared store (Redis) rather than
    /// process-local memory — drives the profiler's no-op fallback and the
    /// `/health` report.
    fn is_shared(&self) -> bool;
}

/// Typed get/set built on top of the raw string backend. Kept as a separate
/// extension trait (rather than generic methods on `Cache`) so `Cache`
/// itself stays object-safe and can be stored as `Arc<dyn Cache>`.
#[async_trait]
pub trait CacheExt: Cache {
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        serde_json::from_str(&raw).ok()
    }

    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, raw, ttl).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

/// Redis-backed shared cache — authoritative per invariant (iv).
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Reachability probe for `/health`.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.ok().flatten()
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn list_push_trim_expire(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        ttl: Duration,
    ) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        // LPUSH + LTRIM + EXPIRE pipelined so the three commits as close to
        // atomically as Redis pipelining allows (§5).
        let (_, _, _): (i64, String, bool) = redis::pipe()
            .lpush(key, &value)
            .ltrim(key, 0, max_len as isize - 1)
            .expire(key, ttl.as_secs() as i64)
            .query_async(&mut conn)
            .await?;
        let items: Vec<String> = conn.lrange(key, 0, max_len as isize - 1).await?;
        Ok(items)
    }

    async fn record_and_count(&self, key: &str, window: Duration) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let now = now_millis();
        let cutoff = now - window.as_millis() as i64;
        let script = redis::Script::new(
            r#"
            redis.call("ZADD", KEYS[1], ARGV[1], ARGV[1])
            redis.call("ZREMRANGEBYSCORE", KEYS[1], "-inf", ARGV[2])
            redis.call("EXPIRE", KEYS[1], ARGV[3])
            return redis.call("ZCARD", KEYS[1])
            "#,
        );
        let count: u64 = script
            .key(key)
            .arg(now)
            .arg(cutoff)
            .arg(window.as_secs() as i64 + 1)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    fn is_shared(&self) -> bool {
        true
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct LocalEntry {
    value: String,
    expires_at: Instant,
}

struct LocalList {
    items: VecDeque<String>,
    expires_at: Instant,
}

struct LocalWindow {
    timestamps: VecDeque<Instant>,
}

/// In-process fallback cache. Used only when `REDIS_URL` is unconfigured;
/// never shared across gateway instances.
#[derive(Clone)]
pub struct LocalCache {
    entries: Arc<DashMap<String, LocalEntry>>,
    lists: Arc<DashMap<String, LocalList>>,
    windows: Arc<DashMap<String, LocalWindow>>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            lists: Arc::new(DashMap::new()),
            windows: Arc::new(DashMap::new()),
        }
    }
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for LocalCache {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.expires_at < Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn list_push_trim_expire(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        ttl: Duration,
    ) -> anyhow::Result<Vec<String>> {
        let mut entry = self.lists.entry(key.to_string()).or_insert_with(|| LocalList {
            items: VecDeque::new(),
            expires_at: Instant::now() + ttl,
        });
        entry.items.push_front(value);
        entry.items.truncate(max_len);
        entry.expires_at = Instant::now() + ttl;
        Ok(entry.items.iter().cloned().collect())
    }

    async fn record_and_count(&self, key: &str, window: Duration) -> anyhow::Result<u64> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| LocalWindow {
                timestamps: VecDeque::new(),
            });
        entry.timestamps.push_back(now);
        while let Some(front) = entry.timestamps.front() {
            if now.duration_since(*front) > window {
                entry.timestamps.pop_front();
            } else {
                break;
            }
        }
        Ok(entry.timestamps.len() as u64)
    }

    fn is_shared(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_cache_roundtrip() {
        let cache = LocalCache::new();
        cache
            .set_json("foo", &"bar".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let got: Option<String> = cache.get_json("foo").await;
        assert_eq!(got, Some("bar".to_string()));
    }

    #[tokio::test]
    async fn local_cache_list_trims() {
        let cache = LocalCache::new();
        for i in 0..25 {
            cache
                .list_push_trim_expire(
                    "paths",
                    format!("seg{}", i),
                    20,
                    Duration::from_secs(3600),
                )
                .await
                .unwrap();
        }
        let items = cache
            .list_push_trim_expire("paths", "last".to_string(), 20, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(items.len(), 20);
        assert_eq!(items[0], "last");
    }

    #[tokio::test]
    async fn local_cache_sliding_window_counts() {
        let cache = LocalCache::new();
        for _ in 0..5 {
            cache
                .record_and_count("client:1", Duration::from_secs(60))
                .await
                .unwrap();
        }
        let count = cache
            .record_and_count("client:1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(count, 6);
    }

    #[test]
    fn is_shared_flags() {
        assert!(!LocalCache::new().is_shared());
    }
}
