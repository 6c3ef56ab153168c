use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Sse},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::crawler::CrawlEngine;
use crate::ia::Persister;
use crate::models::{JobOwner, JobType, ScanOptions, ScanProgress, ScanRequest, ScanResult};
use crate::server::sse;
use crate::tree;
use crate::url_canon;
use crate::AppState;

fn owner_from(addr: SocketAddr, api_key: Option<&str>) -> JobOwner {
    JobOwner {
        user_id: None,
        api_key: api_key.map(|s| s.to_string()),
        ip_hash: Some(format!("{:x}", hash_ip(&addr.ip().to_string()))),
    }
}

fn api_key_header(headers: &HeaderMap) -> Option<&str> {
    headers.get("X-Api-Key").and_then(|v| v.to_str().ok())
}

fn hash_ip(input: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /scan` — run a crawl synchronously and return the assembled tree (§6).
pub async fn scan(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> impl IntoResponse {
    if !state.scan_limiter.check(addr.ip()).await {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    let max_pages = request.max_pages.min(state.config.max_pages_hard_limit);
    let max_depth = request.max_depth.min(state.config.max_depth_hard_limit);

    let engine = CrawlEngine::new(state.fetcher.clone(), state.safety);
    let cancel = CancellationToken::new();

    let output = match engine
        .run(
            &request.url,
            max_pages,
            max_depth,
            &request.options,
            &cancel,
            |_progress: ScanProgress| {},
        )
        .await
    {
        Ok(output) => output,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let tree_output = tree::build(output.pages.clone(), &output.edges, &request.url, &request.options);
    let base_host = url_canon::base_host(&request.url).unwrap_or_default();

    let persister = Persister::new(&state.page_store);
    if let Err(e) = persister.persist_scan(&output.pages, &output.edges, &base_host).await {
        tracing::error!(error = %e, "failed to persist scan");
    }

    let result = ScanResult {
        root: tree_output.root,
        orphans: tree_output.orphans,
        subdomains: tree_output.subdomains,
        errors: output.errors,
        inactive_pages: output.inactive_pages,
        broken_links: output.broken_links,
        files: output.files,
        crosslinks: tree_output.crosslinks,
    };

    Json(result).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStreamParams {
    pub url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(flatten)]
    pub options: ScanOptions,
}

fn default_max_pages() -> u32 {
    200
}

fn default_max_depth() -> u32 {
    5
}

/// `GET /scan-stream` — run a crawl and stream `progress` / `complete` / `error` events.
pub async fn scan_stream(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    Query(params): Query<ScanStreamParams>,
) -> impl IntoResponse {
    if !state.scan_limiter.check(addr.ip()).await {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    let max_pages = params.max_pages.min(state.config.max_pages_hard_limit);
    let max_depth = params.max_depth.min(state.config.max_depth_hard_limit);
    let fetcher = state.fetcher.clone();
    let safety = state.safety;
    let page_store = state.page_store.clone();

    let stream = sse::stream_from(move |tx| async move {
        let engine = CrawlEngine::new(fetcher, safety);
        let cancel = CancellationToken::new();
        let progress_tx = tx.clone();

        let result = engine
            .run(
                &params.url,
                max_pages,
                max_depth,
                &params.options,
                &cancel,
                move |progress: ScanProgress| {
                    let _ = progress_tx.send(sse::named_event("progress", &progress));
                },
            )
            .await;

        match result {
            Ok(output) => {
                let tree_output = tree::build(output.pages.clone(), &output.edges, &params.url, &params.options);
                let base_host = url_canon::base_host(&params.url).unwrap_or_default();

                let persister = Persister::new(&page_store);
                if let Err(e) = persister.persist_scan(&output.pages, &output.edges, &base_host).await {
                    tracing::error!(error = %e, "failed to persist scan");
                }

                let scan_result = ScanResult {
                    root: tree_output.root,
                    orphans: tree_output.orphans,
                    subdomains: tree_output.subdomains,
                    errors: Vec::new(),
                    inactive_pages: Vec::new(),
                    broken_links: output.broken_links,
                    files: output.files,
                    crosslinks: tree_output.crosslinks,
                };
                let _ = tx.send(sse::named_event("complete", &scan_result));
            }
            Err(e) => {
                let _ = tx.send(sse::named_event("error", &json!({ "message": e.to_string() })));
            }
        }
    });

    Sse::into_response(stream)
}

/// `POST /scan-jobs` — enqueue a crawl job, returning `{ "jobId": ... }`.
pub async fn create_scan_job(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ScanRequest>,
) -> impl IntoResponse {
    let owner = owner_from(addr, api_key_header(&headers));

    match state
        .job_store
        .count_recent_for_owner(&owner, Duration::from_secs(60))
        .await
    {
        Ok(count) if count as u32 >= state.config.scan_rate_limit_per_minute => {
            return (StatusCode::TOO_MANY_REQUESTS, "usage limit exceeded").into_response();
        }
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
        _ => {}
    }

    let payload = match serde_json::to_value(&request) {
        Ok(v) => v,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.job_store.create(JobType::Scan, payload, &owner).await {
        Ok(id) => Json(json!({ "jobId": id })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /scan-jobs/:id` — poll current state, progress, and (if finished) result.
pub async fn get_scan_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.job_store.get(&id).await {
        Ok(Some(row)) => Json(job_row_json(&row)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "job not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `POST /scan-jobs/:id/cancel`.
pub async fn cancel_scan_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.job_store.cancel(&id).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /scan-jobs/:id/stream` — tail a job's state over SSE, polling at ~1s (§4.8).
pub async fn stream_scan_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let job_store = state.job_store.clone();

    let stream = sse::stream_from(move |tx| async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            match job_store.get(&id).await {
                Ok(Some(row)) => {
                    let is_terminal = row.status.is_terminal();
                    let _ = tx.send(sse::named_event("progress", &job_row_json(&row)));
                    if is_terminal {
                        let _ = tx.send(sse::named_event("complete", &job_row_json(&row)));
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(sse::named_event(
                        "error",
                        &json!({ "message": "job not found" }),
                    ));
                    break;
                }
                Err(e) => {
                    let _ = tx.send(sse::named_event(
                        "error",
                        &json!({ "message": e.to_string() }),
                    ));
                    break;
                }
            }
        }
    });

    Sse::into_response(stream)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub base_url: String,
}

/// `POST /api/maps/:id/discovery` — enqueue a discovery job for `mapId`, deduping
/// against any already-active discovery job for the same map (§6).
pub async fn create_discovery_job(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(map_id): Path<String>,
    Json(request): Json<DiscoveryRequest>,
) -> impl IntoResponse {
    match state
        .job_store
        .find_active_by_payload_field(JobType::Discovery, "mapId", &map_id)
        .await
    {
        Ok(Some(existing)) => {
            return Json(json!({ "jobId": existing.id, "deduped": true })).into_response();
        }
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Ok(None) => {}
    }

    let owner = owner_from(addr, api_key_header(&headers));
    let payload = json!({ "mapId": map_id, "baseUrl": request.base_url });

    match state
        .job_store
        .create(JobType::Discovery, payload, &owner)
        .await
    {
        Ok(id) => Json(json!({ "jobId": id })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn job_row_json(row: &crate::models::JobRow) -> serde_json::Value {
    json!({
        "id": row.id,
        "type": row.job_type.as_str(),
        "status": row.status.as_str(),
        "progress": row.progress,
        "result": row.result,
        "error": row.error,
        "createdAt": row.created_at,
        "startedAt": row.started_at,
        "finishedAt": row.finished_at,
    })
}
