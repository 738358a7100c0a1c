use std::collections::HashMap;

use anyhow::Context;
use serde::Deserialize;

use crate::models::client::ApiClient;
use crate::models::policy::{AuthPolicy, InspectionRule, PiiRedactionPolicy};
use crate::models::aggregation::Aggregation;

/// Policy document loaded from `config.yaml`. Unknown fields are ignored —
/// operators roll this file forward without the gateway refusing to boot on
/// a field it doesn't understand yet.
#[derive(Debug, Deserialize, Default)]
pub struct PolicyDocument {
    #[serde(default)]
    pub openapi_url: Option<String>,
    #[serde(default = "default_shadow_action")]
    pub on_shadow_api_discovered: String,
    /// The single upstream every catch-all proxy request targets (§4.10).
    #[serde(default)]
    pub backend_target_url: Option<String>,
    /// The black-box auth endpoint `/auth/login` forwards credentials to
    /// (§1 — "the authentication upstream").
    #[serde(default)]
    pub auth_backend_url: Option<String>,
    /// Base URL of the external PII recognizer (§1, §4.9). Absent ⇒ the
    /// null recognizer is used and a startup warning is logged.
    #[serde(default)]
    pub pii_recognizer_url: Option<String>,
    #[serde(default)]
    pub threat_intel: ThreatIntelConfig,
    #[serde(default)]
    pub profiler: ProfilerConfig,
    #[serde(default)]
    pub auth_policies: Vec<AuthPolicy>,
    #[serde(default)]
    pub inspection_rules: Vec<InspectionRule>,
    #[serde(default)]
    pub pii_redaction_policies: Vec<PiiRedactionPolicy>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

fn default_shadow_action() -> String {
    "log".to_string()
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ThreatIntelConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_min_confidence() -> f64 {
    80.0
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ProfilerConfig {
    #[serde(default)]
    pub enforce_header_consistency: bool,
    #[serde(default = "default_max_path_entropy")]
    pub max_path_entropy: f64,
}

fn default_max_path_entropy() -> f64 {
    3.5
}

/// Frozen application settings: environment-sourced secrets + the YAML policy
/// document. Immutable for the process lifetime (the admin endpoint only
/// ever swaps the cartographer's endpoint map, never `Settings` itself).
#[derive(Debug)]
pub struct Settings {
    pub port: u16,
    pub jwt_secret_key: String,
    pub api_clients: HashMap<String, ApiClient>,
    pub redis_url: Option<String>,
    pub policy: PolicyDocument,
}

pub fn load() -> anyhow::Result<Settings> {
    dotenvy::dotenv().ok();

    let jwt_secret_key =
        std::env::var("JWT_SECRET_KEY").context("JWT_SECRET_KEY is required")?;

    let clients_json = std::env::var("API_CLIENTS_JSON")
        .context("API_CLIENTS_JSON is required")?;
    let clients: Vec<ApiClient> = serde_json::from_str(&clients_json)
        .context("API_CLIENTS_JSON is not valid JSON for a list of API clients")?;
    let api_clients = clients
        .into_iter()
        .map(|c| (c.api_key.clone(), c))
        .collect();

    let redis_url = std::env::var("REDIS_URL").ok();

    let config_path =
        std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let policy = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse {} as YAML", config_path))?
    } else {
        PolicyDocument::default()
    };

    let port = std::env::var("GATEWAY_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8443);

    Ok(Settings {
        port,
        jwt_secret_key,
        api_clients,
        redis_url,
        policy,
    })
}
