pub mod config;
pub mod crawler;
pub mod ia;
pub mod jobs;
pub mod models;
pub mod safety;
pub mod server;
pub mod tree;
pub mod url_canon;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::crawler::HttpFetcher;
use crate::ia::PageStore;
use crate::jobs::JobStore;
use crate::safety::HostSafety;
use crate::server::limiter::IpRateLimiter;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub job_store: Arc<JobStore>,
    pub page_store: Arc<PageStore>,
    pub fetcher: HttpFetcher,
    pub safety: HostSafety,
    pub scan_limiter: Arc<IpRateLimiter>,
    pub screenshot_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        job_store: Arc<JobStore>,
        page_store: Arc<PageStore>,
        fetcher: HttpFetcher,
    ) -> Self {
        let safety = HostSafety::new(config.dev_relax_host_safety);
        let scan_limiter = Arc::new(IpRateLimiter::new(config.scan_rate_limit_per_minute));
        let screenshot_limiter = Arc::new(IpRateLimiter::new(
            config.screenshot_rate_limit_per_minute,
        ));

        AppState {
            config,
            job_store,
            page_store,
            fetcher,
            safety,
            scan_limiter,
            screenshot_limiter,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/scan", post(server::routes::scan))
        .route("/scan-stream", get(server::routes::scan_stream))
        .route("/scan-jobs", post(server::routes::create_scan_job))
        .route("/scan-jobs/:id", get(server::routes::get_scan_job))
        .route(
            "/scan-jobs/:id/cancel",
            post(server::routes::cancel_scan_job),
        )
        .route(
            "/scan-jobs/:id/stream",
            get(server::routes::stream_scan_job),
        )
        .route(
            "/api/maps/:id/discovery",
            post(server::routes::create_discovery_job),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            server::auth::require_api_key,
        ));

    let public_routes = Router::new().route("/health", get(server::routes::health));

    Router::new()
        .merge(routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
