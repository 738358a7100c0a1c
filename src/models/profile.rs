use serde::{Deserialize, Serialize};

/// Ephemeral per-client fingerprint stored in the cache with a ~1h TTL
/// (§3). The path history itself lives as a cache list (see `cache.rs`
/// `list_push_trim_expire`); this struct only carries the fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFingerprint {
    pub fingerprint: String,
}

pub const PROFILE_TTL_SECS: u64 = 3600;
pub const PATH_HISTORY_LEN: usize = 20;
