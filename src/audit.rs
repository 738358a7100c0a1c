//! Audit channel — a logical logger distinct from the operational log,
//! per §7: "an audit event is emitted for every blocked request, every
//! discovered shadow API, every WAF match, every PII redaction occurrence
//! (once per request), and every admin mutation."
//!
//! Emitted through `tracing` on the `"audit"` target so operators can
//! route it to its own sink independently of ordinary request logs.

use tracing::{error, warn};

fn fields_to_string(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={:?}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A blocking or otherwise security-significant event. Logged at `error`
/// level on the `audit` target.
pub fn emit_critical(event: &str, fields: &[(&str, &str)]) {
    error!(target: "audit", event, "{} {}", event, fields_to_string(fields));
}

/// A non-blocking but noteworthy event (log-mode shadow API, fail-open
/// degradations). Logged at `warn` level on the `audit` target.
pub fn emit_warning(event: &str, fields: &[(&str, &str)]) {
    warn!(target: "audit", event, "{} {}", event, fields_to_string(fields));
}

/// A blocked request, recorded with the identity and reason §7 requires.
pub fn emit_blocked(client_id: &str, peer: &str, detail: &str) {
    emit_critical(
        "REQUEST_BLOCKED",
        &[("client_id", client_id), ("peer", peer), ("detail", detail)],
    );
}
