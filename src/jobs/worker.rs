//! Worker pool (§4.8): a fixed number of tasks poll the job store at a fixed cadence,
//! claim queued jobs, and dispatch them by type.

use crate::crawler::{CrawlEngine, HttpFetcher};
use crate::ia::Persister;
use crate::ia::PageStore;
use crate::jobs::discovery::DiscoveryRunner;
use crate::jobs::JobStore;
use crate::models::{JobType, ScanProgress, ScanRequest};
use crate::safety::HostSafety;
use crate::tree;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    job_store: Arc<JobStore>,
    page_store: Arc<PageStore>,
    fetcher: HttpFetcher,
    safety: HostSafety,
    poll_interval: Duration,
    pool_size: usize,
}

impl WorkerPool {
    pub fn new(
        job_store: Arc<JobStore>,
        page_store: Arc<PageStore>,
        fetcher: HttpFetcher,
        safety: HostSafety,
        poll_interval: Duration,
        pool_size: usize,
    ) -> Self {
        WorkerPool {
            job_store,
            page_store,
            fetcher,
            safety,
            poll_interval,
            pool_size: pool_size.max(1),
        }
    }

    /// Spawn the fixed-size pool; each task loops forever polling for queued jobs.
    pub fn spawn(self: Arc<Self>) {
        for worker_id in 0..self.pool_size {
            let pool = self.clone();
            tokio::spawn(async move {
                pool.run_loop(worker_id).await;
            });
        }
    }

    async fn run_loop(&self, worker_id: usize) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            match self.job_store.claim().await {
                Ok(Some(job)) => {
                    tracing::info!(worker_id, job_id = %job.id, job_type = %job.job_type.as_str(), "claimed job");
                    self.dispatch(job).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "claim failed");
                }
            }
        }
    }

    async fn dispatch(&self, job: crate::models::JobRow) {
        let cancel = CancellationToken::new();
        let job_id = job.id.clone();

        let watcher = {
            let job_store = self.job_store.clone();
            let job_id = job_id.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            match job_store.is_canceled(&job_id).await {
                                Ok(true) => {
                                    cancel.cancel();
                                    break;
                                }
                                Ok(false) => {}
                                Err(e) => {
                                    tracing::warn!(job_id = %job_id, error = %e, "cancel poll failed");
                                }
                            }
                        }
                    }
                }
            })
        };

        match job.job_type {
            JobType::Scan => {
                if let Err(e) = self.run_scan(&job_id, job.payload.clone(), &cancel).await {
                    tracing::warn!(job_id = %job_id, error = %e, "scan job failed");
                    let _ = self.job_store.fail(&job_id, &e).await;
                }
            }
            JobType::Discovery => {
                if let Err(e) = self.run_discovery(&job_id, job.payload.clone(), &cancel).await {
                    tracing::warn!(job_id = %job_id, error = %e, "discovery job failed");
                    let _ = self.job_store.fail(&job_id, &e).await;
                }
            }
            JobType::Screenshot => {
                // External collaborator; omitted from core (§4.8).
                let _ = self.job_store.fail(&job_id, "screenshot jobs are not handled by this runtime").await;
            }
        }

        cancel.cancel();
        watcher.abort();
    }

    async fn run_scan(
        &self,
        job_id: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let request: ScanRequest = serde_json::from_value(payload).map_err(|e| e.to_string())?;

        let engine = CrawlEngine::new(self.fetcher.clone(), self.safety);
        let job_store = self.job_store.clone();
        let job_id_owned = job_id.to_string();
        let last_reported = std::sync::Mutex::new((0u32, std::time::Instant::now()));

        let output = engine
            .run(
                &request.url,
                request.max_pages,
                request.max_depth,
                &request.options,
                cancel,
                move |progress: ScanProgress| {
                    let mut guard = last_reported.lock().unwrap();
                    let (last_count, last_time) = *guard;
                    let should_report = progress.scanned - last_count >= 5
                        || last_time.elapsed() >= Duration::from_millis(500);
                    if should_report {
                        *guard = (progress.scanned, std::time::Instant::now());
                        let store = job_store.clone();
                        let id = job_id_owned.clone();
                        let snapshot = serde_json::to_value(&progress).unwrap_or_default();
                        tokio::spawn(async move {
                            let _ = store.progress(&id, snapshot).await;
                        });
                    }
                },
            )
            .await
            .map_err(|e| e.to_string())?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        let tree_output = tree::build(output.pages.clone(), &output.edges, &request.url, &request.options);

        let base_host = crate::url_canon::base_host(&request.url).unwrap_or_default();
        let persister = Persister::new(&self.page_store);
        persister
            .persist_scan(&output.pages, &output.edges, &base_host)
            .await
            .map_err(|e| e.to_string())?;

        let result = crate::models::ScanResult {
            root: tree_output.root,
            orphans: tree_output.orphans,
            subdomains: tree_output.subdomains,
            errors: output.errors,
            inactive_pages: output.inactive_pages,
            broken_links: output.broken_links,
            files: output.files,
            crosslinks: tree_output.crosslinks,
        };

        self.job_store
            .complete(job_id, serde_json::to_value(&result).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    async fn run_discovery(
        &self,
        job_id: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let base_url = payload
            .get("baseUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing baseUrl in discovery payload".to_string())?
            .to_string();

        let runner = DiscoveryRunner::new(self.fetcher.clone(), self.safety);
        let job_store = self.job_store.clone();
        let job_id_owned = job_id.to_string();

        let result = runner
            .run(&base_url, cancel, move |progress| {
                let store = job_store.clone();
                let id = job_id_owned.clone();
                let snapshot = serde_json::to_value(&progress).unwrap_or_default();
                tokio::spawn(async move {
                    let _ = store.progress(&id, snapshot).await;
                });
            })
            .await
            .map_err(|e| e.to_string())?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        let base_host = crate::url_canon::base_host(&base_url).unwrap_or_default();
        let persister = Persister::new(&self.page_store);
        persister
            .persist_scan(&result.pages, &[], &base_host)
            .await
            .map_err(|e| e.to_string())?;

        self.job_store
            .complete(job_id, serde_json::to_value(&result.progress).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| e.to_string())?;

        Ok(())
    }
}
