//! Transformer — role-driven PII redaction over the proxied response
//! body (§4.9). The actual entity recognition/anonymization is an
//! external collaborator (§1); this module owns policy lookup and span
//! replacement.

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::policy::PiiRedactionPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct PiiSpan {
    pub start: usize,
    pub end: usize,
}

/// The external PII recognizer interface (§1): `analyze` → spans,
/// `anonymize` → replaced text. Kept as a trait so the HTTP-backed
/// implementation can be swapped for a null implementation when
/// unconfigured (§4.9: "If the recognizer is unavailable, the body is
/// returned unchanged and one warning is logged at startup.").
#[async_trait]
pub trait PiiRecognizer: Send + Sync {
    async fn analyze(&self, text: &str, entities: &[String]) -> anyhow::Result<Vec<PiiSpan>>;
}

pub struct NullRecognizer;

#[async_trait]
impl PiiRecognizer for NullRecognizer {
    async fn analyze(&self, _text: &str, _entities: &[String]) -> anyhow::Result<Vec<PiiSpan>> {
        Ok(Vec::new())
    }
}

/// Calls an external NLP service exposing `POST {base_url}/analyze`.
pub struct HttpPiiRecognizer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPiiRecognizer {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(serde::Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    entities: &'a [String],
}

#[async_trait]
impl PiiRecognizer for HttpPiiRecognizer {
    async fn analyze(&self, text: &str, entities: &[String]) -> anyhow::Result<Vec<PiiSpan>> {
        let resp = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&AnalyzeRequest { text, entities })
            .send()
            .await?
            .error_for_status()?;
        let spans: Vec<PiiSpan> = resp.json().await?;
        Ok(spans)
    }
}

const REDACTED: &str = "[REDACTED]";

/// Replace every span returned by the recognizer with `[REDACTED]`.
/// Spans are assumed non-overlapping; applied back-to-front so earlier
/// offsets stay valid.
fn apply_redactions(text: &str, mut spans: Vec<PiiSpan>) -> String {
    spans.sort_by(|a, b| b.start.cmp(&a.start));
    let mut out = text.to_string();
    for span in spans {
        if span.start <= span.end && span.end <= out.len() && out.is_char_boundary(span.start) && out.is_char_boundary(span.end) {
            out.replace_range(span.start..span.end, REDACTED);
        }
    }
    out
}

/// §4.9: look up the role's policy (or the wildcard), redact, re-encode.
/// Fails open: recognizer errors leave the body unchanged.
pub async fn redact(
    recognizer: &dyn PiiRecognizer,
    policies: &[PiiRedactionPolicy],
    role: &str,
    body: &[u8],
) -> Vec<u8> {
    let Some(policy) = policies.iter().find(|p| p.role == "*" || p.role == role) else {
        return body.to_vec();
    };

    if policy.redact_entities.is_empty() {
        return body.to_vec();
    }

    let body_str = String::from_utf8_lossy(body).into_owned();
    let spans = match recognizer.analyze(&body_str, &policy.redact_entities).await {
        Ok(spans) => spans,
        Err(e) => {
            tracing::warn!("PII recognizer call failed, returning body unredacted: {}", e);
            return body.to_vec();
        }
    };

    if spans.is_empty() {
        return body.into();
    }

    let redacted = apply_redactions(&body_str, spans);
    crate::audit::emit_warning("PII_REDACTED", &[("role", role)]);
    redacted.into_bytes()
}
