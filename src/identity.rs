//! Identity — the two resolvers invoked before the inspection pipeline
//! (§4.2). Neither resolver mutates any inspector state; a failure here
//! must leave every downstream counter untouched (§8 invariant).

use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::errors::AppError;
use crate::models::claims::UserClaims;
use crate::models::client::ApiClient;

pub const TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    user_id: String,
    role: String,
    exp: i64,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// `resolve_client`: requires `x-api-key`, matches it constant-time
/// against the provisioned table, then checks the peer address against
/// the client's allow-list, if any.
pub fn resolve_client<'a>(
    headers: &HeaderMap,
    peer: &str,
    settings: &'a Settings,
) -> Result<&'a ApiClient, AppError> {
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidApiKey)?;

    let client = settings
        .api_clients
        .values()
        .find(|c| c.key_matches(presented))
        .ok_or(AppError::InvalidApiKey)?;

    if !client.source_address_allowed(peer) {
        return Err(AppError::AddressNotAllowed);
    }

    Ok(client)
}

/// `resolve_user`: absent token ⇒ anonymous claim set. Present token ⇒
/// HS256-verified, or `401 invalid credentials`.
pub fn resolve_user(headers: &HeaderMap, settings: &Settings) -> Result<UserClaims, AppError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(UserClaims::anonymous());
    };

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret_key.as_bytes()),
        &Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .map_err(|_| AppError::InvalidCredentials)?;

    let claims = data.claims;
    Ok(UserClaims {
        user_id: Some(claims.user_id),
        role: Some(claims.role),
        extra: claims.extra,
        exp: Some(claims.exp),
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Issue a fresh 30-minute HS256 token for the given user/role, used by
/// both `/auth/login` and `/auth/refresh` (§9 — one identity module).
pub fn issue_token(user_id: &str, role: &str, secret: &str) -> Result<String, AppError> {
    let exp = (chrono::Utc::now() + chrono::Duration::minutes(TOKEN_TTL_MINUTES)).timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        user_id: user_id.to_string(),
        role: role.to_string(),
        exp,
        extra: serde_json::Map::new(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_with_client(client: ApiClient) -> Settings {
        let mut api_clients = HashMap::new();
        api_clients.insert(client.api_key.clone(), client);
        Settings {
            port: 8443,
            jwt_secret_key: "test-secret".into(),
            api_clients,
            redis_url: None,
            policy: crate::config::PolicyDocument::default(),
        }
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let settings = settings_with_client(ApiClient {
            client_id: "c1".into(),
            api_key: "k".into(),
            role: "customer".into(),
            allowed_source_addresses: vec![],
        });
        let err = resolve_client(&HeaderMap::new(), "1.2.3.4", &settings).unwrap_err();
        assert!(matches!(err, AppError::InvalidApiKey));
    }

    #[test]
    fn unknown_api_key_is_rejected() {
        let settings = settings_with_client(ApiClient {
            client_id: "c1".into(),
            api_key: "k".into(),
            role: "customer".into(),
            allowed_source_addresses: vec![],
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "wrong".parse().unwrap());
        let err = resolve_client(&headers, "1.2.3.4", &settings).unwrap_err();
        assert!(matches!(err, AppError::InvalidApiKey));
    }

    #[test]
    fn disallowed_address_is_rejected() {
        let settings = settings_with_client(ApiClient {
            client_id: "c1".into(),
            api_key: "k".into(),
            role: "customer".into(),
            allowed_source_addresses: vec!["10.0.0.1".into()],
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "k".parse().unwrap());
        let err = resolve_client(&headers, "10.0.0.2", &settings).unwrap_err();
        assert!(matches!(err, AppError::AddressNotAllowed));
    }

    #[test]
    fn no_token_yields_anonymous_claims() {
        let settings = settings_with_client(ApiClient {
            client_id: "c1".into(),
            api_key: "k".into(),
            role: "customer".into(),
            allowed_source_addresses: vec![],
        });
        let claims = resolve_user(&HeaderMap::new(), &settings).unwrap();
        assert_eq!(claims.user_id, None);
    }

    #[test]
    fn issued_token_round_trips() {
        let secret = "test-secret";
        let token = issue_token("42", "customer", secret).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        let settings = settings_with_client(ApiClient {
            client_id: "c1".into(),
            api_key: "k".into(),
            role: "customer".into(),
            allowed_source_addresses: vec![],
        });
        let claims = resolve_user(&headers, &settings).unwrap();
        assert_eq!(claims.user_id.as_deref(), Some("42"));
        assert_eq!(claims.role.as_deref(), Some("customer"));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = issue_token("42", "customer", "right-secret").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        let settings = settings_with_client(ApiClient {
            client_id: "c1".into(),
            api_key: "k".into(),
            role: "customer".into(),
            allowed_source_addresses: vec![],
        });
        let settings = Settings {
            jwt_secret_key: "wrong-secret".into(),
            ..settings
        };
        let err = resolve_user(&headers, &settings).unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }
}
