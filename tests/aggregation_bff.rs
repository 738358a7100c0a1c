//! BFF aggregation tests (scenarios 3 and 4 of the testable-properties
//! list): a partial backend failure folds into a per-query error object
//! while the overall response stays 200, and a query that outlives the
//! global deadline turns the whole aggregation into a 504.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway::models::aggregation::{Aggregation, QueryConfig, ANONYMOUS_ROLE};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn query(name: &str, url: String) -> QueryConfig {
    QueryConfig {
        name: name.to_string(),
        http_method: "GET".to_string(),
        backend_url: url,
        params: None,
        body: None,
        adapter: None,
    }
}

#[tokio::test]
async fn one_failing_query_degrades_to_an_error_object_not_an_overall_failure() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "Ada" })))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&backend)
        .await;

    let agg = Aggregation {
        public_path: "/bff/screen_home".into(),
        required_role: ANONYMOUS_ROLE.into(),
        queries: vec![
            query("profile", format!("{}/profile", backend.uri())),
            query("feed", format!("{}/feed", backend.uri())),
        ],
        cache_ttl_secs: None,
    };
    let mut policy = common::base_policy(backend.uri());
    policy.aggregations = vec![agg];
    let app = common::build_router(policy);

    let request = Request::builder()
        .method("GET")
        .uri("/bff/screen_home")
        .header("x-api-key", common::API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["profile"]["name"], "Ada");
    assert_eq!(json["feed"]["error"], "backend error: 503");
}

#[tokio::test]
async fn a_query_past_the_global_deadline_times_out_the_whole_aggregation() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(6)))
        .mount(&backend)
        .await;

    let agg = Aggregation {
        public_path: "/bff/slow_screen".into(),
        required_role: ANONYMOUS_ROLE.into(),
        queries: vec![query("slow", format!("{}/slow", backend.uri()))],
        cache_ttl_secs: None,
    };
    let mut policy = common::base_policy(backend.uri());
    policy.aggregations = vec![agg];
    let app = common::build_router(policy);

    let request = Request::builder()
        .method("GET")
        .uri("/bff/slow_screen")
        .header("x-api-key", common::API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}
