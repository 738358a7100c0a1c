use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway::cache::{Cache, LocalCache, RedisCache};
use gateway::cartographer::{Cartographer, ShadowPolicy};
use gateway::config;
use gateway::proxy::UpstreamClient;
use gateway::transformer::{HttpPiiRecognizer, NullRecognizer, PiiRecognizer};
use gateway::{aggregator::CompiledAggregation, util::origin_of, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "gateway=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = config::load()?;
    let port = settings.port;

    let cache: Arc<dyn Cache> = match &settings.redis_url {
        Some(url) => {
            tracing::info!("connecting to shared cache...");
            Arc::new(RedisCache::connect(url).await?)
        }
        None => {
            tracing::warn!(
                "no REDIS_URL configured; falling back to the in-process cache. \
                 the behavioral profiler will run as a no-op."
            );
            Arc::new(LocalCache::new())
        }
    };

    let http_client = reqwest::Client::new();
    let upstream_client = UpstreamClient::new();

    let known = match &settings.policy.openapi_url {
        Some(url) => Cartographer::fetch_openapi(&http_client, url).await.unwrap_or_else(|e| {
            tracing::error!("cartographer failed to initialize from '{}': {}", url, e);
            Default::default()
        }),
        None => {
            tracing::warn!("no openapi_url configured; API discovery will be less effective.");
            Default::default()
        }
    };
    tracing::info!("cartographer initialized with {} known endpoints", known.len());
    let on_shadow = ShadowPolicy::from_config(&settings.policy.on_shadow_api_discovered);
    let cartographer = Cartographer::new(known, on_shadow);

    let pii_recognizer: Box<dyn PiiRecognizer> = match &settings.policy.pii_recognizer_url {
        Some(url) => Box::new(HttpPiiRecognizer::new(http_client.clone(), url.clone())),
        None => {
            tracing::warn!("no pii_recognizer_url configured; PII redaction is disabled.");
            Box::new(NullRecognizer)
        }
    };

    let aggregations = settings.policy.aggregations.clone();
    let compiled_aggregations: Vec<CompiledAggregation> =
        aggregations.iter().map(CompiledAggregation::compile).collect();
    let aggregation_hosts: Vec<String> = aggregations
        .iter()
        .flat_map(|a| a.queries.iter())
        .filter_map(|q| origin_of(&q.backend_url))
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();

    let state = Arc::new(AppState {
        settings,
        http_client,
        upstream_client,
        cache,
        cartographer,
        aggregations,
        compiled_aggregations,
        aggregation_hosts,
        pii_recognizer,
    });

    let app = gateway::api::router(state)
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("security gateway listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Injects a unique `x-request-id` into every response so operators can
/// correlate errors with gateway logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Baseline security headers applied to every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("Referrer-Policy", "no-referrer".parse().unwrap());
    headers.insert("Cache-Control", "no-store".parse().unwrap());
    resp
}
