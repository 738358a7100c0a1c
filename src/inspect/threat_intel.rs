//! Threat-intel inspector (§4.5). Queries an external IP reputation
//! provider; fails closed only on a confirmed bad score, fails open on
//! every other kind of trouble — "upstream availability must not gate
//! all traffic."

use serde::Deserialize;

use crate::config::ThreatIntelConfig;
use crate::errors::AppError;

const DEFAULT_BASE_URL: &str = "https://api.abuseipdb.com/api/v2/check";

#[derive(Debug, Deserialize)]
struct ReputationEnvelope {
    data: ReputationData,
}

#[derive(Debug, Deserialize, Default)]
struct ReputationData {
    #[serde(rename = "abuseConfidenceScore", default)]
    abuse_confidence_score: f64,
}

/// Returns `Err(AppError::IpListed)` only when the provider is configured
/// and positively reports a confidence score at or above the threshold.
pub async fn check(
    client: &reqwest::Client,
    config: &ThreatIntelConfig,
    peer: &str,
) -> Result<(), AppError> {
    let Some(api_key) = &config.api_key else {
        return Ok(());
    };
    let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

    let result = client
        .get(base_url)
        .header("Key", api_key)
        .header("Accept", "application/json")
        .query(&[("ipAddress", peer), ("maxAgeInDays", "90")])
        .send()
        .await;

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("threat-intel lookup failed for {}: {}", peer, e);
            return Ok(());
        }
    };

    if !response.status().is_success() {
        tracing::warn!("threat-intel provider returned {}", response.status());
        return Ok(());
    }

    let envelope: ReputationEnvelope = match response.json().await {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("threat-intel response was unparseable: {}", e);
            return Ok(());
        }
    };

    if envelope.data.abuse_confidence_score >= config.min_confidence {
        crate::audit::emit_critical(
            "IP_BLACKLISTED",
            &[
                ("peer", peer),
                ("score", &envelope.data.abuse_confidence_score.to_string()),
            ],
        );
        return Err(AppError::IpListed);
    }

    Ok(())
}
