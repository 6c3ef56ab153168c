//! Crawler (§4.5): breadth-first traversal over the frontier, producing page nodes,
//! broken-link records, and file references for the tree builder.

use crate::crawler::extractor;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::sitemap;
use crate::models::{
    BrokenLink, DiscoverySource, FileRef, LinkEdge, PageNode, PageStatus, ScanOptions, ScanProgress,
};
use crate::safety::HostSafety;
use crate::url_canon;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Generic paths probed at depth 1 alongside whatever the homepage links to,
/// catching pages with no inbound link from the root (§4.5).
const COMMON_SEED_PATHS: &[&str] = &[
    "/about", "/about-us", "/contact", "/contact-us", "/blog", "/news", "/products", "/services",
    "/pricing", "/faq", "/support", "/help", "/docs", "/documentation", "/privacy", "/privacy-policy",
    "/terms", "/terms-of-service", "/login", "/signup", "/register", "/careers", "/jobs", "/team",
    "/company", "/resources", "/case-studies", "/testimonials", "/sitemap", "/partners",
];

/// Hard cap on opportunistic link-liveness checks performed during a single scan (§4.5).
const BROKEN_LINK_CHECK_CAP: u32 = 500;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid seed URL: {0}")]
    InvalidSeed(String),
}

#[derive(Debug, Default)]
pub struct CrawlOutput {
    pub pages: Vec<PageNode>,
    pub errors: Vec<PageNode>,
    pub inactive_pages: Vec<PageNode>,
    pub broken_links: Vec<BrokenLink>,
    pub files: Vec<FileRef>,
    /// Every `(from → to)` link edge observed during extraction, independent of the
    /// single first-referrer kept on each `PageNode` (§4.5, §9).
    pub edges: Vec<LinkEdge>,
}

pub struct CrawlEngine {
    fetcher: HttpFetcher,
    safety: HostSafety,
}

impl CrawlEngine {
    pub fn new(fetcher: HttpFetcher, safety: HostSafety) -> Self {
        CrawlEngine { fetcher, safety }
    }

    /// Run a breadth-first crawl from `seed_url`, calling `on_progress` after each
    /// page and honoring `cancel` cooperatively (§4.5, §4.8).
    pub async fn run(
        &self,
        seed_url: &str,
        max_pages: u32,
        max_depth: u32,
        options: &ScanOptions,
        cancel: &CancellationToken,
        on_progress: impl Fn(ScanProgress),
    ) -> Result<CrawlOutput, CrawlError> {
        let seed_host =
            url_canon::base_host(seed_url).ok_or_else(|| CrawlError::InvalidSeed(seed_url.to_string()))?;
        let seed_root = url_canon::registrable_root(&seed_host);

        let mut frontier = Frontier::new();
        frontier.enqueue(seed_url, 0, None);

        if let Some(origin) = url_canon::origin_of(seed_url) {
            for path in COMMON_SEED_PATHS {
                frontier.enqueue(&format!("{origin}{path}"), 1, Some(seed_url.to_string()));
            }
        }

        let mut sitemap_orders: HashMap<String, u32> = HashMap::new();
        if !cancel.is_cancelled() {
            let sitemap_result = sitemap::discover(&self.fetcher, seed_url, options.subdomains).await;
            for entry in sitemap_result.urls {
                if frontier.enqueue(&entry.url, 1, None) {
                    if let Ok(key) = url_canon::canonical_key(&entry.url) {
                        sitemap_orders.insert(key, entry.sitemap_order);
                    }
                }
            }
        }

        let mut output = CrawlOutput::default();
        let broken_link_checks = AtomicU32::new(0);
        let mut discovery_index: u32 = 0;

        while !frontier.is_empty() {
            if cancel.is_cancelled() {
                break;
            }
            if output.pages.len() as u32 >= max_pages {
                break;
            }

            let entry = match frontier.pop() {
                Some(e) => e,
                None => break,
            };

            if entry.depth > max_depth {
                continue;
            }

            if !self.host_admitted(&entry.url, &seed_host, &seed_root, options.subdomains) {
                continue;
            }

            if self.safety.assert_safe(&entry.url).await.is_err() {
                continue;
            }

            let canonical_key = url_canon::canonical_key(&entry.url).unwrap_or_default();
            let sitemap_order = sitemap_orders.get(&canonical_key).copied();
            let discovery_source = if sitemap_order.is_some() {
                DiscoverySource::Sitemap
            } else {
                DiscoverySource::Crawl
            };

            let fetch_result = match self.fetcher.fetch_page(&entry.url, &[]).await {
                Ok(r) => r,
                Err(_) => {
                    let stub = stub_node(&entry, discovery_index, discovery_source, sitemap_order);
                    discovery_index += 1;
                    if options.broken_links {
                        output.broken_links.push(BrokenLink {
                            url: entry.url.clone(),
                            source_url: entry.referrer.clone(),
                            status: 0,
                        });
                    }
                    if options.inactive_pages {
                        output.inactive_pages.push(stub.clone());
                    }
                    output.pages.push(stub);
                    on_progress(ScanProgress {
                        scanned: output.pages.len() as u32,
                        queued: frontier.queued_len() as u32,
                    });
                    continue;
                }
            };

            let is_html = fetch_result
                .content_type
                .as_deref()
                .map(|ct| ct.contains("html"))
                .unwrap_or(true);

            if !is_html {
                if options.files {
                    output.files.push(FileRef {
                        url: entry.url.clone(),
                        source_url: entry.referrer.clone(),
                        content_type: fetch_result.content_type.clone(),
                    });
                }
                continue;
            }

            let status = classify_status(fetch_result.status);

            if status == PageStatus::Error {
                let keep_body = options.error_pages
                    || (options.authenticated_pages
                        && matches!(fetch_result.status, 401 | 403));

                let node = PageNode {
                    id: PageNode::id_for(&entry.url),
                    url: entry.url.clone(),
                    final_url: Some(fetch_result.final_url.clone()),
                    canonical_url: None,
                    title: Some(extractor::humanize_path_tail(&entry.url)),
                    parent_url: url_canon::parent_url(&entry.url),
                    referrer_url: entry.referrer.clone(),
                    auth_required: matches!(fetch_result.status, 401 | 403),
                    thumbnail_url: None,
                    http_status: Some(fetch_result.status),
                    was_redirect: false,
                    is_missing: false,
                    is_duplicate: false,
                    duplicate_of: None,
                    discovery_index: Some(discovery_index),
                    discovery_source,
                    depth: entry.depth,
                    sitemap_order,
                    children: Vec::new(),
                };
                discovery_index += 1;

                if keep_body {
                    output.errors.push(node.clone());
                }
                if options.inactive_pages {
                    output.inactive_pages.push(node.clone());
                }
                if options.broken_links {
                    output.broken_links.push(BrokenLink {
                        url: entry.url.clone(),
                        source_url: entry.referrer.clone(),
                        status: fetch_result.status,
                    });
                }

                output.pages.push(node);
                on_progress(ScanProgress {
                    scanned: output.pages.len() as u32,
                    queued: frontier.queued_len() as u32,
                });
                continue;
            }

            let extracted = extractor::extract(&fetch_result.html, &fetch_result.final_url);

            for link in &extracted.links {
                if extractor::is_asset_link(link) {
                    if options.files {
                        output.files.push(FileRef {
                            url: link.clone(),
                            source_url: Some(entry.url.clone()),
                            content_type: None,
                        });
                    }
                    continue;
                }
                if self.host_admitted(link, &seed_host, &seed_root, options.subdomains) {
                    output.edges.push(LinkEdge {
                        from: entry.url.clone(),
                        to: link.clone(),
                    });
                    if !frontier.has_seen(link) {
                        frontier.enqueue(link, entry.depth + 1, Some(entry.url.clone()));
                    }
                }
            }

            if options.broken_links
                && broken_link_checks.load(Ordering::Relaxed) < BROKEN_LINK_CHECK_CAP
            {
                for link in &extracted.links {
                    if broken_link_checks.fetch_add(1, Ordering::Relaxed) >= BROKEN_LINK_CHECK_CAP {
                        break;
                    }
                    let link_status = self.fetcher.check_link_status(link).await;
                    if link_status.status == 0 || link_status.status >= 400 {
                        output.broken_links.push(BrokenLink {
                            url: link.clone(),
                            source_url: Some(entry.url.clone()),
                            status: link_status.status,
                        });
                    }
                }
            }

            let title = extracted
                .title
                .or_else(|| Some(extractor::humanize_path_tail(&entry.url)));

            let node = PageNode {
                id: PageNode::id_for(&entry.url),
                url: entry.url.clone(),
                final_url: Some(fetch_result.final_url.clone()),
                canonical_url: extracted.canonical_url,
                title,
                parent_url: url_canon::parent_url(&entry.url),
                referrer_url: entry.referrer.clone(),
                auth_required: false,
                thumbnail_url: if options.thumbnails { extracted.thumbnail_url } else { None },
                http_status: Some(fetch_result.status),
                was_redirect: fetch_result.final_url != entry.url,
                is_missing: false,
                is_duplicate: false,
                duplicate_of: None,
                discovery_index: Some(discovery_index),
                discovery_source,
                depth: entry.depth,
                sitemap_order,
                children: Vec::new(),
            };
            discovery_index += 1;
            output.pages.push(node);

            on_progress(ScanProgress {
                scanned: output.pages.len() as u32,
                queued: frontier.queued_len() as u32,
            });
        }

        Ok(output)
    }

    fn host_admitted(&self, url: &str, seed_host: &str, seed_root: &str, allow_subdomains: bool) -> bool {
        let host = match url_canon::base_host(url) {
            Some(h) => h,
            None => return false,
        };
        if allow_subdomains {
            url_canon::registrable_root(&host) == seed_root
        } else {
            host == seed_host
        }
    }
}

/// A node for a URL whose fetch failed at the transport layer (§4.5: "insert a stub
/// node, continue").
fn stub_node(
    entry: &FrontierEntry,
    discovery_index: u32,
    discovery_source: DiscoverySource,
    sitemap_order: Option<u32>,
) -> PageNode {
    PageNode {
        id: PageNode::id_for(&entry.url),
        url: entry.url.clone(),
        final_url: None,
        canonical_url: None,
        title: Some(extractor::humanize_path_tail(&entry.url)),
        parent_url: url_canon::parent_url(&entry.url),
        referrer_url: entry.referrer.clone(),
        auth_required: false,
        thumbnail_url: None,
        http_status: None,
        was_redirect: false,
        is_missing: true,
        is_duplicate: false,
        duplicate_of: None,
        discovery_index: Some(discovery_index),
        discovery_source,
        depth: entry.depth,
        sitemap_order,
        children: Vec::new(),
    }
}

fn classify_status(status: u16) -> PageStatus {
    match status {
        200..=299 => PageStatus::Active,
        300..=399 => PageStatus::Redirect,
        _ => PageStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), PageStatus::Active);
        assert_eq!(classify_status(301), PageStatus::Redirect);
        assert_eq!(classify_status(404), PageStatus::Error);
        assert_eq!(classify_status(500), PageStatus::Error);
    }

    #[tokio::test]
    async fn test_host_admitted_same_host_only() {
        let engine = CrawlEngine::new(HttpFetcher::new(5), HostSafety::new(false));
        assert!(engine.host_admitted("https://example.com/a", "example.com", "example.com", false));
        assert!(!engine.host_admitted("https://blog.example.com/a", "example.com", "example.com", false));
    }

    #[tokio::test]
    async fn test_host_admitted_subdomains_allowed() {
        let engine = CrawlEngine::new(HttpFetcher::new(5), HostSafety::new(false));
        assert!(engine.host_admitted("https://blog.example.com/a", "example.com", "example.com", true));
        assert!(!engine.host_admitted("https://other.com/a", "example.com", "example.com", true));
    }

    #[test]
    fn test_stub_node_marks_missing() {
        let entry = FrontierEntry {
            url: "https://example.com/gone".to_string(),
            depth: 1,
            referrer: Some("https://example.com/".to_string()),
        };
        let node = stub_node(&entry, 3, DiscoverySource::Crawl, None);
        assert!(node.is_missing);
        assert_eq!(node.http_status, None);
        assert_eq!(node.discovery_index, Some(3));
    }
}
