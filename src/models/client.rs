use serde::Deserialize;
use subtle::ConstantTimeEq;

/// A provisioned API client, loaded from `API_CLIENTS_JSON` at startup and
/// immutable for the process lifetime (§3 invariants).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiClient {
    pub client_id: String,
    pub api_key: String,
    pub role: String,
    #[serde(default, alias = "allowed_ips")]
    pub allowed_source_addresses: Vec<String>,
}

impl ApiClient {
    /// Constant-time comparison of the presented key against this client's
    /// key — invariant (i): an `ApiClient` row is only matched this way.
    pub fn key_matches(&self, presented: &str) -> bool {
        let a = self.api_key.as_bytes();
        let b = presented.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.ct_eq(b).into()
    }

    pub fn source_address_allowed(&self, peer: &str) -> bool {
        self.allowed_source_addresses.is_empty()
            || self.allowed_source_addresses.iter().any(|a| a == peer)
    }
}
