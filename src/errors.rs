use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// The gateway's error taxonomy (spec §7). Every inspector failure is
/// mapped to one of these before it reaches the client; `into_response`
/// is the single place that decides the wire status/body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid or missing API key")]
    InvalidApiKey,

    #[error("address not allowed")]
    AddressNotAllowed,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("malicious signature: {pattern} in {location}")]
    MaliciousSignature { pattern: String, location: String },

    #[error("policy violation: {reason}")]
    PolicyViolation { reason: String },

    #[error("schema validation failed: {0}")]
    SchemaInvalid(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("ip listed")]
    IpListed,

    #[error("fingerprint changed")]
    FingerprintChanged,

    #[error("high-entropy browsing")]
    HighEntropy,

    #[error("too many errors")]
    TooManyErrors,

    #[error("velocity too high")]
    VelocityTooHigh,

    #[error("shadow api discovered")]
    ShadowApi,

    #[error("backend unavailable")]
    BackendUnavailable,

    #[error("gateway timeout")]
    GatewayTimeout,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, msg) = match &self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                self.to_string(),
            ),
            AppError::AddressNotAllowed => (
                StatusCode::FORBIDDEN,
                "permission_error",
                self.to_string(),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                self.to_string(),
            ),
            AppError::MaliciousSignature { .. } => (
                StatusCode::FORBIDDEN,
                "waf_error",
                self.to_string(),
            ),
            AppError::PolicyViolation { .. } => (
                StatusCode::FORBIDDEN,
                "policy_error",
                self.to_string(),
            ),
            AppError::SchemaInvalid(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                self.to_string(),
            ),
            AppError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "permission_error",
                self.to_string(),
            ),
            AppError::IpListed => (
                StatusCode::FORBIDDEN,
                "permission_error",
                self.to_string(),
            ),
            AppError::FingerprintChanged => (
                StatusCode::FORBIDDEN,
                "permission_error",
                self.to_string(),
            ),
            AppError::HighEntropy => (
                StatusCode::FORBIDDEN,
                "permission_error",
                self.to_string(),
            ),
            AppError::TooManyErrors => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                self.to_string(),
            ),
            AppError::VelocityTooHigh => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                self.to_string(),
            ),
            AppError::ShadowApi => (
                StatusCode::NOT_IMPLEMENTED,
                "shadow_api_error",
                self.to_string(),
            ),
            AppError::BackendUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_error",
                self.to_string(),
            ),
            AppError::GatewayTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout_error",
                self.to_string(),
            ),
            AppError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                self.to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "status": status.as_u16(),
            }
        }));

        let mut response = (status, body).into_response();
        if matches!(self, AppError::TooManyErrors | AppError::VelocityTooHigh) {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from_static("60"));
        }
        response
    }
}

/// Whether this failure counts toward the per-client error window (§4.8).
/// Fail-open inspectors never construct an `AppError` in the first place,
/// so every variant here is, by construction, a pipeline failure.
impl AppError {
    pub fn is_inspection_failure(&self) -> bool {
        !matches!(
            self,
            AppError::BackendUnavailable | AppError::GatewayTimeout | AppError::Internal(_)
        )
    }
}
