//! Sitemap Ingestor (§4.4): walks the well-known sitemap entry points, recurses into
//! sitemap indices, and yields same-host URLs in discovery order.

use crate::crawler::fetcher::HttpFetcher;
use crate::url_canon;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Hard cap on the number of sitemap documents fetched per scan (§4.4).
const MAX_SITEMAP_DOCUMENTS: usize = 12;

const ENTRY_POINTS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-index.xml", "/sitemap.txt"];

#[derive(Debug, Clone)]
pub struct SitemapUrl {
    pub url: String,
    pub sitemap_order: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SitemapResult {
    pub urls: Vec<SitemapUrl>,
    pub documents_fetched: u32,
}

/// Walk a site's sitemap entry points, following sitemap indices up to the
/// document cap, and collect same-host URLs (respecting `allow_subdomains`).
pub async fn discover(
    fetcher: &HttpFetcher,
    seed_url: &str,
    allow_subdomains: bool,
) -> SitemapResult {
    let origin = match url_canon::origin_of(seed_url) {
        Some(o) => o,
        None => return SitemapResult::default(),
    };
    let seed_host = match url_canon::base_host(seed_url) {
        Some(h) => h,
        None => return SitemapResult::default(),
    };
    let seed_root = url_canon::registrable_root(&seed_host);

    let loc_re = Regex::new(r"<loc>\s*(.*?)\s*</loc>").expect("valid regex");

    let mut to_visit: Vec<String> = ENTRY_POINTS
        .iter()
        .map(|path| format!("{origin}{path}"))
        .collect();
    let mut fetched_docs: HashSet<String> = HashSet::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut out = SitemapResult::default();
    let mut order: u32 = 0;

    while let Some(doc_url) = to_visit.pop() {
        if fetched_docs.len() >= MAX_SITEMAP_DOCUMENTS {
            break;
        }
        if !fetched_docs.insert(doc_url.clone()) {
            continue;
        }

        let body = match fetch_document(fetcher, &doc_url).await {
            Some(b) => b,
            None => continue,
        };

        if doc_url.ends_with(".txt") {
            for line in body.lines() {
                let candidate = line.trim();
                if candidate.is_empty() {
                    continue;
                }
                record_url(
                    candidate,
                    &seed_host,
                    &seed_root,
                    allow_subdomains,
                    &mut seen_urls,
                    &mut out,
                    &mut order,
                );
            }
            continue;
        }

        if body.contains("<sitemapindex") {
            for child in extract_locs(&loc_re, &body) {
                if fetched_docs.len() + to_visit.len() < MAX_SITEMAP_DOCUMENTS {
                    to_visit.push(child);
                }
            }
            continue;
        }

        for loc in extract_locs(&loc_re, &body) {
            record_url(
                &loc,
                &seed_host,
                &seed_root,
                allow_subdomains,
                &mut seen_urls,
                &mut out,
                &mut order,
            );
        }
    }

    out.documents_fetched = fetched_docs.len() as u32;
    out
}

fn record_url(
    candidate: &str,
    seed_host: &str,
    seed_root: &str,
    allow_subdomains: bool,
    seen: &mut HashSet<String>,
    out: &mut SitemapResult,
    order: &mut u32,
) {
    let host = match Url::parse(candidate).ok().and_then(|u| u.host_str().map(|h| h.to_lowercase())) {
        Some(h) => h,
        None => return,
    };
    let admitted = if allow_subdomains {
        url_canon::registrable_root(&host) == seed_root
    } else {
        host == *seed_host || host == format!("www.{seed_host}")
    };
    if !admitted {
        return;
    }
    if let Ok(key) = url_canon::canonical_key(candidate) {
        if seen.insert(key) {
            out.urls.push(SitemapUrl {
                url: candidate.to_string(),
                sitemap_order: *order,
            });
            *order += 1;
        }
    }
}

async fn fetch_document(fetcher: &HttpFetcher, url: &str) -> Option<String> {
    let result = fetcher.fetch_page(url, &[]).await.ok()?;
    if result.status >= 200 && result.status < 400 {
        Some(result.html)
    } else {
        None
    }
}

fn extract_locs(re: &Regex, xml: &str) -> Vec<String> {
    re.captures_iter(xml)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_locs_standard_sitemap() {
        let re = Regex::new(r"<loc>\s*(.*?)\s*</loc>").unwrap();
        let xml = r#"<urlset>
  <url><loc>https://example.com/</loc></url>
  <url><loc>https://example.com/about</loc></url>
</urlset>"#;
        let urls = extract_locs(&re, xml);
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/about"]);
    }

    #[test]
    fn test_extract_locs_empty() {
        let re = Regex::new(r"<loc>\s*(.*?)\s*</loc>").unwrap();
        assert!(extract_locs(&re, "<urlset></urlset>").is_empty());
    }

    #[test]
    fn test_detect_sitemap_index() {
        let xml = r#"<sitemapindex><sitemap><loc>https://example.com/a.xml</loc></sitemap></sitemapindex>"#;
        assert!(xml.contains("<sitemapindex"));
    }

    #[test]
    fn test_record_url_filters_other_hosts() {
        let mut seen = HashSet::new();
        let mut out = SitemapResult::default();
        let mut order = 0;
        record_url(
            "https://other.com/x",
            "example.com",
            "example.com",
            false,
            &mut seen,
            &mut out,
            &mut order,
        );
        assert!(out.urls.is_empty());
    }

    #[test]
    fn test_record_url_admits_www_variant() {
        let mut seen = HashSet::new();
        let mut out = SitemapResult::default();
        let mut order = 0;
        record_url(
            "https://www.example.com/x",
            "example.com",
            "example.com",
            false,
            &mut seen,
            &mut out,
            &mut order,
        );
        assert_eq!(out.urls.len(), 1);
    }

    #[test]
    fn test_record_url_admits_subdomain_when_allowed() {
        let mut seen = HashSet::new();
        let mut out = SitemapResult::default();
        let mut order = 0;
        record_url(
            "https://blog.example.com/x",
            "example.com",
            "example.com",
            true,
            &mut seen,
            &mut out,
            &mut order,
        );
        assert_eq!(out.urls.len(), 1);

        let mut seen2 = HashSet::new();
        let mut out2 = SitemapResult::default();
        let mut order2 = 0;
        record_url(
            "https://blog.example.com/x",
            "example.com",
            "example.com",
            false,
            &mut seen2,
            &mut out2,
            &mut order2,
        );
        assert!(out2.urls.is_empty());
    }

    #[test]
    fn test_record_url_assigns_monotonic_order() {
        let mut seen = HashSet::new();
        let mut out = SitemapResult::default();
        let mut order = 0;
        record_url("https://example.com/a", "example.com", "example.com", false, &mut seen, &mut out, &mut order);
        record_url("https://example.com/b", "example.com", "example.com", false, &mut seen, &mut out, &mut order);
        assert_eq!(out.urls[0].sitemap_order, 0);
        assert_eq!(out.urls[1].sitemap_order, 1);
    }

    #[test]
    fn test_record_url_dedups() {
        let mut seen = HashSet::new();
        let mut out = SitemapResult::default();
        let mut order = 0;
        record_url("https://example.com/a", "example.com", "example.com", false, &mut seen, &mut out, &mut order);
        record_url("https://example.com/a", "example.com", "example.com", false, &mut seen, &mut out, &mut order);
        assert_eq!(out.urls.len(), 1);
    }
}
