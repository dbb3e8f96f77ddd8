// tests/metrics.rs
// One test per process: the Prometheus recorder is global.
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use ecoscan::api::{self, AppState};
use ecoscan::metrics::Metrics;

fn build_app() -> Router {
    let state = AppState::in_memory();
    let categories = state.service.taxonomy().rules.len();
    let metrics = Metrics::init(categories).expect("install prometheus recorder");
    api::router(state.with_metrics(metrics))
}

#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let app = build_app();

    let scan = Request::post("/api/v1/ecoscan")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"user_id":"m1","predictions":[{"label":"tricycle","confidence":0.5}]}"#,
        ))
        .unwrap();
    let resp = app.clone().oneshot(scan).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap(); // 1 MiB
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "ecoscan_actions_total",
        "category=\"bike\"",
        "ecoscan_scans_total",
        "ecoscan_eco_score",
        "ecoscan_taxonomy_categories 11",
    ] {
        assert!(
            text.contains(needle),
            "metrics output is missing `{needle}`:\n{text}"
        );
    }
}
