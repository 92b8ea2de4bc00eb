//! End-to-end API tests against the real router and shipped artifacts.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use nide::{build_router, AppState, ForestModel, SchedulerConfig};

fn test_state() -> Arc<AppState> {
    let model = Arc::new(ForestModel::load("artifacts/model.json").unwrap());
    let config = SchedulerConfig {
        max_batch_size: 8,
        max_wait: Duration::from_millis(5),
        worker_concurrency: 2,
    };
    Arc::new(AppState::new(model, config))
}

fn test_server() -> TestServer {
    TestServer::new(build_router(test_state())).unwrap()
}

fn baseline_record() -> Value {
    json!({
        "protocol_type": "tcp",
        "service": "http",
        "flag": "SF",
        "src_bytes": 215,
        "dst_bytes": 45076,
        "logged_in": 1,
        "same_srv_rate": 1.0
    })
}

#[tokio::test]
async fn root_banner_reports_service() {
    let server = test_server();
    let response = server.get("/").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "Network Intrusion Detection API");
}

#[tokio::test]
async fn health_reports_model_and_classes() {
    let server = test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "RandomForest");
    let classes = body["classes"].as_array().unwrap();
    assert!(classes.iter().any(|c| c == "normal"));
    assert!(classes.iter().any(|c| c == "DoS"));
}

#[tokio::test]
async fn predict_classifies_the_baseline_as_normal() {
    let server = test_server();
    let response = server.post("/predict").json(&baseline_record()).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["prediction"], "normal");
    assert_eq!(body["description"]["color"], "green");
    assert!(body["latency_ms"].as_f64().unwrap() >= 0.0);

    let total: f64 = body["probabilities"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn predict_rejects_out_of_range_field() {
    let server = test_server();
    let response = server
        .post("/predict")
        .json(&json!({ "serror_rate": 1.5 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["code"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("serror_rate"));
}

#[tokio::test]
async fn predict_rejects_unknown_service() {
    let server = test_server();
    let response = server
        .post("/predict")
        .json(&json!({ "service": "gopher_v2" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_rejects_empty_and_oversized_payloads() {
    let server = test_server();

    let response = server.post("/predict/batch").json(&json!([])).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let oversized: Vec<Value> = (0..1001).map(|_| json!({})).collect();
    let response = server.post("/predict/batch").json(&oversized).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn batch_pairs_predictions_with_records_in_order() {
    let server = test_server();
    let syn_flood = json!({
        "protocol_type": "tcp",
        "service": "private",
        "flag": "S0",
        "count": 300,
        "serror_rate": 0.9,
        "srv_serror_rate": 0.9,
        "same_srv_rate": 0.05
    });
    let records = json!([baseline_record(), syn_flood, baseline_record()]);

    let response = server.post("/predict/batch").json(&records).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["total"], 3);
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0]["prediction"], "normal");
    assert_eq!(predictions[1]["prediction"], "DoS");
    assert_eq!(predictions[2]["prediction"], "normal");
}

#[tokio::test]
async fn predict_after_shutdown_returns_service_unavailable() {
    let state = test_state();
    let server = TestServer::new(build_router(state.clone())).unwrap();

    state.scheduler.shutdown().await;
    let response = server.post("/predict").json(&baseline_record()).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = response.json();
    assert_eq!(body["code"], "unavailable");
}
