//! Anomaly counters (§4.8): two 60-second sliding windows per
//! `client_id`. Mirrors the source's `track_request`: the current
//! request's own timestamp is folded into the window before the
//! threshold is checked, so the offending request is the one that trips
//! it.

use std::time::Duration;

use crate::cache::Cache;
use crate::errors::AppError;

pub const ERROR_THRESHOLD: u64 = 10;
pub const PATH_ENUMERATION_THRESHOLD: u64 = 20;
const WINDOW: Duration = Duration::from_secs(60);

/// Runs after every inspector in the pipeline has had a chance to run
/// (§9 — one finally-style step, grounded on the source's `finally`
/// block around `track_request`). `is_error` reflects whether any prior
/// step already failed this request.
pub async fn track(cache: &dyn Cache, client_id: &str, is_error: bool) -> Result<(), AppError> {
    if is_error {
        let error_key = format!("anomaly:errors:{}", client_id);
        let count = cache
            .record_and_count(&error_key, WINDOW)
            .await
            .map_err(AppError::Internal)?;
        if count > ERROR_THRESHOLD {
            crate::audit::emit_critical("ANOMALY_BLOCKED", &[("client_id", client_id), ("kind", "errors")]);
            return Err(AppError::TooManyErrors);
        }
    }

    let path_key = format!("anomaly:paths:{}", client_id);
    let count = cache
        .record_and_count(&path_key, WINDOW)
        .await
        .map_err(AppError::Internal)?;
    if count > PATH_ENUMERATION_THRESHOLD {
        crate::audit::emit_critical("ANOMALY_BLOCKED", &[("client_id", client_id), ("kind", "velocity")]);
        return Err(AppError::VelocityTooHigh);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;

    #[tokio::test]
    async fn velocity_threshold_trips_on_the_21st_request() {
        let cache = LocalCache::new();
        for _ in 0..20 {
            track(&cache, "c1", false).await.unwrap();
        }
        let err = track(&cache, "c1", false).await.unwrap_err();
        assert!(matches!(err, AppError::VelocityTooHigh));
    }

    #[tokio::test]
    async fn error_threshold_trips_on_the_11th_error() {
        let cache = LocalCache::new();
        for _ in 0..10 {
            track(&cache, "c1", true).await.unwrap();
        }
        let err = track(&cache, "c1", true).await.unwrap_err();
        assert!(matches!(err, AppError::TooManyErrors));
    }

    #[tokio::test]
    async fn clean_requests_never_touch_error_window() {
        let cache = LocalCache::new();
        for _ in 0..50 {
            track(&cache, "c1", false).await.unwrap();
        }
    }
}
