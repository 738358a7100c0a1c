use std::collections::HashMap;

use serde::Deserialize;

/// Declarative per-query field selector/renamer, applied after a
/// successful upstream response (§3, §4.11 step 5).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Adapter {
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub rename: Option<HashMap<String, String>>,
}

/// One sub-request of an aggregation, as loaded from YAML. `backend_url`,
/// `params`, and `body` may contain `{scope.key}` placeholders; they are
/// compiled once into a template AST by `aggregator::CompiledAggregation`
/// rather than re-parsed per request (§9 design note).
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub name: String,
    pub http_method: String,
    pub backend_url: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub adapter: Option<Adapter>,
}

/// Sentinel `required_role` meaning "anonymous accepted" (§4.11 step 1).
pub const ANONYMOUS_ROLE: &str = "mobile_guest";

/// One public BFF endpoint: fan out to `queries` under a global deadline.
#[derive(Debug, Clone, Deserialize)]
pub struct Aggregation {
    pub public_path: String,
    pub required_role: String,
    pub queries: Vec<QueryConfig>,
    /// Cache TTL in seconds for the combined result (§4.11 final bullet).
    /// `None` disables caching for this endpoint.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: Option<u64>,
}

fn default_cache_ttl() -> Option<u64> {
    Some(60)
}
