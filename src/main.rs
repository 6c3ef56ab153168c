use sitegraph::config::Config;
use sitegraph::crawler::HttpFetcher;
use sitegraph::ia::PageStore;
use sitegraph::jobs::{JobStore, WorkerPool};
use sitegraph::{build_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

const FETCHER_RATE_PER_SECOND: u32 = 2;

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env().expect("failed to load configuration"));
    let port = config.port;

    let job_store = Arc::new(
        JobStore::open(&config.database_url)
            .await
            .expect("failed to open job store"),
    );
    let page_store = Arc::new(
        PageStore::open(&config.database_url)
            .await
            .expect("failed to open page store"),
    );
    let fetcher = HttpFetcher::new(FETCHER_RATE_PER_SECOND);

    let worker_pool = Arc::new(WorkerPool::new(
        job_store.clone(),
        page_store.clone(),
        fetcher.clone(),
        sitegraph::safety::HostSafety::new(config.dev_relax_host_safety),
        Duration::from_millis(config.worker_poll_interval_ms),
        config.worker_pool_size,
    ));
    worker_pool.spawn();

    let state = AppState::new(config.clone(), job_store, page_store, fetcher);
    let app = build_app(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("sitegraph service starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
