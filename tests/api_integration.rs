use axum::http::StatusCode;
use axum_test::TestServer;
use sitegraph::config::Config;
use sitegraph::crawler::HttpFetcher;
use sitegraph::ia::PageStore;
use sitegraph::jobs::JobStore;
use sitegraph::{build_app, AppState};
use serde_json::json;
use std::sync::Arc;

async fn test_state() -> AppState {
    let config = Arc::new(Config {
        database_url: "sqlite::memory:".to_string(),
        port: 0,
        dev_relax_host_safety: true,
        max_pages_hard_limit: 50,
        max_depth_hard_limit: 5,
        worker_pool_size: 1,
        worker_poll_interval_ms: 50,
        scan_rate_limit_per_minute: 1000,
        screenshot_rate_limit_per_minute: 1000,
        api_key: None,
    });

    let job_store = Arc::new(JobStore::open(&config.database_url).await.unwrap());
    let page_store = Arc::new(PageStore::open(&config.database_url).await.unwrap());
    let fetcher = HttpFetcher::new(5);

    AppState::new(config, job_store, page_store, fetcher)
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = test_state().await;
    let app = build_app(state);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/health").await;
    response.assert_status(StatusCode::OK);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_enqueue_and_poll_scan_job() {
    let state = test_state().await;
    let app = build_app(state);
    let server = TestServer::new(app).unwrap();

    let scan_request = json!({
        "url": "https://example.invalid/",
        "maxPages": 1,
        "maxDepth": 1,
        "options": {}
    });

    let response = server.post("/scan-jobs").json(&scan_request).await;
    response.assert_status(StatusCode::OK);
    let body = response.json::<serde_json::Value>();
    let job_id = body["jobId"].as_str().expect("jobId present").to_string();

    let status_response = server.get(&format!("/scan-jobs/{job_id}")).await;
    status_response.assert_status(StatusCode::OK);
    let status_body = status_response.json::<serde_json::Value>();
    assert_eq!(status_body["id"], job_id);
    let status = status_body["status"].as_str().unwrap();
    assert!(["queued", "running", "complete", "failed"].contains(&status));
}

#[tokio::test]
async fn test_cancel_unknown_job_is_ok_response() {
    let state = test_state().await;
    let app = build_app(state);
    let server = TestServer::new(app).unwrap();

    // Cancelling an id that does not exist is a no-op at the store layer, not an error.
    let response = server.post("/scan-jobs/does-not-exist/cancel").await;
    response.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_get_unknown_job_returns_404() {
    let state = test_state().await;
    let app = build_app(state);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/scan-jobs/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_discovery_job_dedupes_same_map_id() {
    let state = test_state().await;
    let app = build_app(state);
    let server = TestServer::new(app).unwrap();

    let discovery_request = json!({ "baseUrl": "https://example.invalid/" });

    let first = server
        .post("/api/maps/map-1/discovery")
        .json(&discovery_request)
        .await;
    first.assert_status(StatusCode::OK);
    let first_id = first.json::<serde_json::Value>()["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    let second = server
        .post("/api/maps/map-1/discovery")
        .json(&discovery_request)
        .await;
    second.assert_status(StatusCode::OK);
    let second_body = second.json::<serde_json::Value>();
    assert_eq!(second_body["jobId"].as_str().unwrap(), first_id);
    assert_eq!(second_body["deduped"], true);
}

#[tokio::test]
async fn test_api_key_rejects_missing_header() {
    let mut state = test_state().await;
    state.config = Arc::new(Config {
        api_key: Some("secret-key".to_string()),
        ..(*state.config).clone()
    });
    let app = build_app(state);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/scan-jobs/anything").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}
