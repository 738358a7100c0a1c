//! Shared fixtures for the integration tests: a minimal `Settings` with
//! two provisioned API clients and a router builder that wires an
//! `AppState` the way `main.rs` does, minus the parts (Redis, a real PII
//! engine) each individual test doesn't need.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::MockConnectInfo;
use axum::Router;

use gateway::aggregator::CompiledAggregation;
use gateway::cache::LocalCache;
use gateway::cartographer::{Cartographer, ShadowPolicy};
use gateway::config::{PolicyDocument, Settings};
use gateway::models::client::ApiClient;
use gateway::proxy::UpstreamClient;
use gateway::transformer::NullRecognizer;
use gateway::AppState;

pub const API_KEY: &str = "customer-test-key";
pub const ADMIN_API_KEY: &str = "admin-test-key";
pub const JWT_SECRET: &str = "integration-test-secret";

pub fn api_clients() -> HashMap<String, ApiClient> {
    let mut clients = HashMap::new();
    clients.insert(
        API_KEY.to_string(),
        ApiClient {
            client_id: "customer-1".into(),
            api_key: API_KEY.into(),
            role: "customer".into(),
            allowed_source_addresses: vec![],
        },
    );
    clients.insert(
        ADMIN_API_KEY.to_string(),
        ApiClient {
            client_id: "admin-1".into(),
            api_key: ADMIN_API_KEY.into(),
            role: "admin".into(),
            allowed_source_addresses: vec![],
        },
    );
    clients
}

/// A `PolicyDocument` with nothing but the catch-all backend pointed at
/// `backend_target_url`; tests extend it with `auth_policies`,
/// `inspection_rules`, or `aggregations` as needed.
pub fn base_policy(backend_target_url: String) -> PolicyDocument {
    PolicyDocument {
        backend_target_url: Some(backend_target_url),
        ..Default::default()
    }
}

/// Assembles the full router against an in-process cache (no Redis
/// required) and a null PII recognizer.
pub fn build_router(policy: PolicyDocument) -> Router {
    let settings = Settings {
        port: 8443,
        jwt_secret_key: JWT_SECRET.into(),
        api_clients: api_clients(),
        redis_url: None,
        policy,
    };

    let aggregations = settings.policy.aggregations.clone();
    let compiled_aggregations: Vec<CompiledAggregation> =
        aggregations.iter().map(CompiledAggregation::compile).collect();

    let state = Arc::new(AppState {
        settings,
        http_client: reqwest::Client::new(),
        upstream_client: UpstreamClient::new(),
        cache: Arc::new(LocalCache::new()),
        cartographer: Cartographer::empty(ShadowPolicy::Log),
        aggregations,
        compiled_aggregations,
        aggregation_hosts: Vec::new(),
        pii_recognizer: Box::new(NullRecognizer),
    });

    gateway::api::router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 1337))))
}
