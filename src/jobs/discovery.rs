//! Discovery Subsystem (§4.9): probes a fixed list of common subdomain prefixes,
//! walks any sitemap found at each live origin, and registers the resulting URLs.

use crate::crawler::extractor;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::sitemap;
use crate::models::{DiscoverySource, PageNode};
use crate::safety::HostSafety;
use crate::url_canon;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const DISCOVERY_PREFIXES: &[&str] = &[
    "dev", "staging", "test", "beta", "qa", "old", "legacy", "v1", "archive", "admin", "internal",
    "portal", "api",
];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryProgress {
    pub prefixes_checked: u32,
    pub subdomains_found: u32,
    pub urls_discovered: u32,
    pub urls_processed: u32,
}

#[derive(Debug, Default)]
pub struct DiscoveryOutput {
    pub pages: Vec<PageNode>,
    pub progress: DiscoveryProgress,
}

pub struct DiscoveryRunner {
    fetcher: HttpFetcher,
    safety: HostSafety,
}

impl DiscoveryRunner {
    pub fn new(fetcher: HttpFetcher, safety: HostSafety) -> Self {
        DiscoveryRunner { fetcher, safety }
    }

    pub async fn run(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
        on_progress: impl Fn(DiscoveryProgress),
    ) -> Result<DiscoveryOutput, DiscoveryError> {
        let base_host = url_canon::base_host(base_url)
            .ok_or_else(|| DiscoveryError::InvalidBaseUrl(base_url.to_string()))?;

        let mut progress = DiscoveryProgress::default();
        let mut pages = Vec::new();
        let mut discovery_index = 0u32;

        for prefix in DISCOVERY_PREFIXES {
            if cancel.is_cancelled() {
                break;
            }
            progress.prefixes_checked += 1;

            let candidate_host = format!("{prefix}.{base_host}");
            let origin = match self.probe_origin(&candidate_host).await {
                Some(o) => o,
                None => {
                    on_progress(progress.clone());
                    continue;
                }
            };
            progress.subdomains_found += 1;

            let sitemap_result = sitemap::discover(&self.fetcher, &format!("{origin}/"), false).await;
            progress.urls_discovered += sitemap_result.urls.len() as u32;
            on_progress(progress.clone());

            for entry in sitemap_result.urls {
                if cancel.is_cancelled() {
                    break;
                }
                if self.safety.assert_safe(&entry.url).await.is_err() {
                    continue;
                }
                let status = self.fetcher.check_link_status(&entry.url).await;
                progress.urls_processed += 1;

                let http_status = if status.status == 0 { None } else { Some(status.status) };
                pages.push(PageNode {
                    id: PageNode::id_for(&entry.url),
                    url: entry.url.clone(),
                    final_url: None,
                    canonical_url: None,
                    title: Some(extractor::humanize_path_tail(&entry.url)),
                    parent_url: url_canon::parent_url(&entry.url),
                    referrer_url: None,
                    auth_required: false,
                    thumbnail_url: None,
                    http_status,
                    was_redirect: false,
                    is_missing: http_status.is_none(),
                    is_duplicate: false,
                    duplicate_of: None,
                    discovery_index: Some(discovery_index),
                    discovery_source: DiscoverySource::Sitemap,
                    depth: url_canon::depth_of(&entry.url),
                    sitemap_order: Some(entry.sitemap_order),
                    children: Vec::new(),
                });
                discovery_index += 1;

                on_progress(progress.clone());
            }
        }

        Ok(DiscoveryOutput { pages, progress })
    }

    /// Probe `https://{host}/` then `http://{host}/`; the first that returns any
    /// status at all (even an error page) wins (§4.9).
    async fn probe_origin(&self, host: &str) -> Option<String> {
        for scheme in ["https", "http"] {
            let url = format!("{scheme}://{host}/");
            if self.safety.assert_safe(&url).await.is_err() {
                continue;
            }
            if self.fetcher.fetch_page(&url, &[]).await.is_ok() {
                return Some(format!("{scheme}://{host}"));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_prefixes_count() {
        assert_eq!(DISCOVERY_PREFIXES.len(), 13);
    }
}
