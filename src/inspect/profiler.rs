//! Behavioral profiler (§4.6): per-client fingerprint consistency and
//! path-entropy analysis, keyed by `client_id` in the shared cache.
//!
//! Grounded on the original's `profile_and_analyze`: the fingerprint is
//! the unseparated concatenation of `User-Agent` and `Accept-Language`,
//! and the entropy window tracks only the *leading* path segment of each
//! request, not the full path.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use crate::cache::{Cache, CacheExt};
use crate::config::ProfilerConfig;
use crate::errors::AppError;
use crate::models::profile::{ClientFingerprint, PATH_HISTORY_LEN, PROFILE_TTL_SECS};
use crate::util::shannon_entropy;

fn fingerprint_of(headers: &HeaderMap) -> String {
    let ua = headers.get("user-agent").and_then(|v| v.to_str().ok()).unwrap_or("");
    let lang = headers
        .get("accept-language")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    format!("{}{}", ua, lang)
}

fn leading_segment(path: &str) -> String {
    path.split('/')
        .find(|s| !s.is_empty())
        .unwrap_or("root")
        .to_string()
}

/// Runs the two checks in order. A missing shared cache is a silent
/// no-op (logged once by the caller at startup, per §4.6).
pub async fn analyze(
    cache: &Arc<dyn Cache>,
    config: &ProfilerConfig,
    client_id: &str,
    headers: &HeaderMap,
    path: &str,
) -> Result<(), AppError> {
    if !cache.is_shared() {
        return Ok(());
    }

    let profile_key = format!("profile:{}", client_id);
    let current = fingerprint_of(headers);

    let existing: Option<ClientFingerprint> = cache.get_json(&profile_key).await;
    match existing {
        None => {
            cache
                .set_json(
                    &profile_key,
                    &ClientFingerprint { fingerprint: current },
                    Duration::from_secs(PROFILE_TTL_SECS),
                )
                .await
                .map_err(AppError::Internal)?;
            return Ok(());
        }
        Some(stored) => {
            if config.enforce_header_consistency && stored.fingerprint != current {
                crate::audit::emit_critical(
                    "FINGERPRINT_CHANGED",
                    &[("client_id", client_id)],
                );
                return Err(AppError::FingerprintChanged);
            }
        }
    }

    let history_key = format!("profile:paths:{}", client_id);
    let history = cache
        .list_push_trim_expire(
            &history_key,
            leading_segment(path),
            PATH_HISTORY_LEN,
            Duration::from_secs(PROFILE_TTL_SECS),
        )
        .await
        .map_err(AppError::Internal)?;

    let entropy = shannon_entropy(history.iter());
    if entropy > config.max_path_entropy {
        crate::audit::emit_critical(
            "HIGH_ENTROPY_BROWSING",
            &[("client_id", client_id), ("entropy", &entropy.to_string())],
        );
        return Err(AppError::HighEntropy);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use async_trait::async_trait;

    /// `LocalCache` reports `is_shared() == false`, so the profiler treats
    /// it as absent. Wrap it to exercise the consistency/entropy paths
    /// without standing up Redis.
    struct SharedLocalCache(LocalCache);

    #[async_trait]
    impl Cache for SharedLocalCache {
        async fn get_raw(&self, key: &str) -> Option<String> {
            self.0.get_raw(key).await
        }
        async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
            self.0.set_raw(key, value, ttl).await
        }
        async fn list_push_trim_expire(
            &self,
            key: &str,
            value: String,
            max_len: usize,
            ttl: Duration,
        ) -> anyhow::Result<Vec<String>> {
            self.0.list_push_trim_expire(key, value, max_len, ttl).await
        }
        async fn record_and_count(&self, key: &str, window: Duration) -> anyhow::Result<u64> {
            self.0.record_and_count(key, window).await
        }
        fn is_shared(&self) -> bool {
            true
        }
    }

    fn headers_with(ua: &str, lang: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("user-agent", ua.parse().unwrap());
        h.insert("accept-language", lang.parse().unwrap());
        h
    }

    #[test]
    fn leading_segment_extracts_first_component() {
        assert_eq!(leading_segment("/users/42/profile"), "users");
        assert_eq!(leading_segment("/"), "root");
    }

    #[tokio::test]
    async fn local_cache_is_a_no_op() {
        let cache: Arc<dyn Cache> = Arc::new(LocalCache::new());
        let config = ProfilerConfig {
            enforce_header_consistency: true,
            max_path_entropy: 0.0,
        };
        let headers = headers_with("ua", "en");
        assert!(analyze(&cache, &config, "c1", &headers, "/x").await.is_ok());
    }

    #[tokio::test]
    async fn first_observation_stores_fingerprint_and_passes() {
        let cache: Arc<dyn Cache> = Arc::new(SharedLocalCache(LocalCache::new()));
        let config = ProfilerConfig {
            enforce_header_consistency: true,
            max_path_entropy: 3.5,
        };
        let headers = headers_with("ua-1", "en");
        assert!(analyze(&cache, &config, "c1", &headers, "/a").await.is_ok());
    }

    #[tokio::test]
    async fn changed_fingerprint_is_rejected() {
        let cache: Arc<dyn Cache> = Arc::new(SharedLocalCache(LocalCache::new()));
        let config = ProfilerConfig {
            enforce_header_consistency: true,
            max_path_entropy: 3.5,
        };
        analyze(&cache, &config, "c1", &headers_with("ua-1", "en"), "/a")
            .await
            .unwrap();
        let err = analyze(&cache, &config, "c1", &headers_with("ua-2", "en"), "/a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FingerprintChanged));
    }

    #[tokio::test]
    async fn high_entropy_path_history_is_rejected() {
        let cache: Arc<dyn Cache> = Arc::new(SharedLocalCache(LocalCache::new()));
        let config = ProfilerConfig {
            enforce_header_consistency: false,
            max_path_entropy: 1.0,
        };
        let headers = headers_with("ua", "en");
        analyze(&cache, &config, "c1", &headers, "/a").await.unwrap();
        for path in ["/b", "/c", "/d", "/e", "/f"] {
            let _ = analyze(&cache, &config, "c1", &headers, path).await;
        }
        let err = analyze(&cache, &config, "c1", &headers, "/g").await.unwrap_err();
        assert!(matches!(err, AppError::HighEntropy));
    }
}
