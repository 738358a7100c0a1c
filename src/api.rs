//! Router assembly and the request-level handlers that aren't a single
//! component on their own: `/auth/login`, `/auth/refresh`, `/health`,
//! the catch-all proxy, and the per-aggregation BFF routes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::aggregator;
use crate::cache::CacheExt;
use crate::errors::AppError;
use crate::identity;
use crate::inspect::{anomaly, authz, payload, profiler, threat_intel};
use crate::proxy;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/admin/spec", post(admin_spec_push));

    for agg in &state.aggregations {
        router = router.route(&agg.public_path, get(aggregation_handler).post(aggregation_handler));
    }

    router.fallback(any(proxy_handler)).with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(serde::Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Deserialize)]
struct AuthBackendResponse {
    user_id: String,
    role: String,
}

/// §6: proxies to the configured auth backend; on `{user_id, role}`
/// issues an HS256 token.
async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    identity::resolve_client(&headers, &addr.ip().to_string(), &state.settings)?;

    let Some(auth_backend_url) = &state.settings.policy.auth_backend_url else {
        return Err(AppError::Internal(anyhow::anyhow!(
            "no auth backend configured"
        )));
    };

    let resp = state
        .http_client
        .post(auth_backend_url)
        .json(&serde_json::json!({ "email": body.email, "password": body.password }))
        .send()
        .await
        .map_err(|_| AppError::BackendUnavailable)?;

    if !resp.status().is_success() {
        return Err(AppError::InvalidCredentials);
    }

    let auth: AuthBackendResponse = resp
        .json()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let token = identity::issue_token(&auth.user_id, &auth.role, &state.settings.jwt_secret_key)?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

/// §6: requires `x-api-key` and a valid bearer token; re-issues with the
/// same claims (§9 — login/refresh share the identity module).
async fn refresh(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    identity::resolve_client(&headers, &addr.ip().to_string(), &state.settings)?;
    let claims = identity::resolve_user(&headers, &state.settings)?;
    let user_id = claims.user_id.ok_or(AppError::InvalidCredentials)?;
    let role = claims.role.ok_or(AppError::InvalidCredentials)?;

    let token = identity::issue_token(&user_id, &role, &state.settings.jwt_secret_key)?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

#[derive(serde::Serialize)]
struct HealthReport {
    status: &'static str,
    cache_shared: bool,
    unreachable_hosts: Vec<String>,
}

/// §6: cache status plus reachability of every aggregation backend host.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut unreachable = Vec::new();
    for host in &state.aggregation_hosts {
        let reachable = state
            .http_client
            .head(host)
            .send()
            .await
            .map(|r| r.status().as_u16() < 500)
            .unwrap_or(false);
        if !reachable {
            unreachable.push(host.clone());
        }
    }

    let status = if unreachable.is_empty() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = HealthReport {
        status: if unreachable.is_empty() { "ok" } else { "degraded" },
        cache_shared: state.cache.is_shared(),
        unreachable_hosts: unreachable,
    };
    (status, Json(body))
}

async fn admin_spec_push(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, AppError> {
    let client = identity::resolve_client(&headers, &addr.ip().to_string(), &state.settings)?;
    if client.role != "admin" {
        return Err(AppError::Forbidden(
            "this action requires admin privileges".to_string(),
        ));
    }

    let spec = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("request body is not valid UTF-8".to_string()))?;
    let size = crate::admin::apply_spec_push(&state.cartographer, spec)?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!("cartographer re-initialized with {} known endpoints", size),
    })))
}

async fn aggregation_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query_params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    uri: axum::http::Uri,
) -> Result<impl IntoResponse, AppError> {
    identity::resolve_client(&headers, &addr.ip().to_string(), &state.settings)?;
    let claims = identity::resolve_user(&headers, &state.settings)?;
    let path = uri.path();

    let agg = state
        .aggregations
        .iter()
        .find(|a| a.public_path == path)
        .ok_or(AppError::BadRequest("unknown aggregation endpoint".to_string()))?;

    if agg.required_role != crate::models::aggregation::ANONYMOUS_ROLE {
        let role = claims.role.as_deref().ok_or(AppError::InvalidCredentials)?;
        if role != agg.required_role {
            return Err(AppError::Forbidden("forbidden".to_string()));
        }
    }

    let compiled = state
        .compiled_aggregations
        .iter()
        .find(|a| a.public_path == agg.public_path)
        .expect("every aggregation has a compiled counterpart");

    let path_params: HashMap<String, String> = HashMap::new();
    let context = aggregator::build_context(&claims, &path_params, &query_params);
    let user_key = claims.user_id.as_deref().unwrap_or("anon");

    let result = aggregator::run_cached(
        state.cache.as_ref(),
        &state.http_client,
        compiled,
        user_key,
        &context,
    )
    .await?;

    Ok(Json(Value::Object(result)))
}

/// The catch-all inspection-pipeline-then-forward handler (§2, §4.10).
async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    uri: axum::http::Uri,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, AppError> {
    let peer = addr.ip().to_string();
    let path = uri.path().to_string();

    let client = identity::resolve_client(&headers, &peer, &state.settings)?;
    let claims = identity::resolve_user(&headers, &state.settings)?;

    let outcome = run_pipeline(
        &state,
        &client.client_id,
        &client.role,
        &claims,
        &method,
        &path,
        uri.query(),
        &peer,
        &headers,
        &body,
    )
    .await;

    let is_error = outcome.is_err() && outcome.as_ref().err().map(AppError::is_inspection_failure).unwrap_or(false);
    if let Err(err) = anomaly::track(state.cache.as_ref(), &client.client_id, is_error).await {
        crate::audit::emit_blocked(&client.client_id, &peer, &err.to_string());
        return Err(err);
    }

    if let Err(err) = outcome {
        crate::audit::emit_blocked(&client.client_id, &peer, &err.to_string());
        return Err(err);
    }

    let Some(backend_base) = &state.settings.policy.backend_target_url else {
        return Err(AppError::Internal(anyhow::anyhow!("no backend_target_url configured")));
    };
    let url = proxy::build_upstream_url(backend_base, &path, uri.query());

    let response = state
        .upstream_client
        .forward(method, &url, headers, body)
        .await?;

    let status = proxy::status_from_reqwest(response.status());
    let mut response_headers = HeaderMap::new();
    for (name, value) in response.headers().iter() {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
            axum::http::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.insert(name, value);
        }
    }
    proxy::strip_hop_by_hop(&mut response_headers);

    let body_bytes = response.bytes().await.map_err(|e| AppError::Internal(e.into()))?;
    let redacted = crate::transformer::redact(
        state.pii_recognizer.as_ref(),
        &state.settings.policy.pii_redaction_policies,
        &client.role,
        &body_bytes,
    )
    .await;

    Ok((status, response_headers, redacted))
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    state: &AppState,
    client_id: &str,
    role: &str,
    claims: &crate::models::claims::UserClaims,
    method: &Method,
    path: &str,
    query: Option<&str>,
    peer: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), AppError> {
    state.cartographer.check(method.as_str(), path)?;

    threat_intel::check(&state.http_client, &state.settings.policy.threat_intel, peer).await?;

    let canonical_query = payload::canonicalize(query.unwrap_or(""));
    let body_str = String::from_utf8_lossy(body);
    let canonical_body = payload::canonicalize(&body_str);

    payload::sweep_signatures(&canonical_query, &canonical_body)?;
    payload::evaluate_rules(
        &state.settings.policy.inspection_rules,
        method.as_str(),
        path,
        body,
        &canonical_query,
        &canonical_body,
    )?;

    profiler::analyze(&state.cache, &state.settings.policy.profiler, client_id, headers, path).await?;

    authz::enforce(&state.settings.policy.auth_policies, role, claims, method.as_str(), path)?;

    Ok(())
}
