//! Security gateway — library crate backing the `gateway` binary and the
//! integration tests in `tests/`.

use std::sync::Arc;

use crate::aggregator::CompiledAggregation;
use crate::cache::Cache;
use crate::cartographer::Cartographer;
use crate::config::Settings;
use crate::models::aggregation::Aggregation;
use crate::proxy::UpstreamClient;
use crate::transformer::PiiRecognizer;

pub mod admin;
pub mod aggregator;
pub mod api;
pub mod audit;
pub mod cache;
pub mod cartographer;
pub mod config;
pub mod errors;
pub mod identity;
pub mod inspect;
pub mod models;
pub mod proxy;
pub mod signatures;
pub mod transformer;
pub mod util;

/// Shared application state handed to every handler (§5 — long-lived,
/// connection-pooled clients; hot-swappable cartographer; an immutable
/// `Settings`).
pub struct AppState {
    pub settings: Settings,
    pub http_client: reqwest::Client,
    pub upstream_client: UpstreamClient,
    pub cache: Arc<dyn Cache>,
    pub cartographer: Cartographer,
    pub aggregations: Vec<Aggregation>,
    pub compiled_aggregations: Vec<CompiledAggregation>,
    pub aggregation_hosts: Vec<String>,
    pub pii_recognizer: Box<dyn PiiRecognizer>,
}
