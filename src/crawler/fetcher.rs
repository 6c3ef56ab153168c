//! HTTP Fetcher (§4.2) — status-preserving GET/HEAD with a per-domain rate limiter.

use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

const USER_AGENT: &str = "SiteGraphBot/1.0 (+https://example.invalid/bot)";
const FETCH_TIMEOUT_SECS: u64 = 20;
const LINK_CHECK_TIMEOUT_SECS: u64 = 10;
const MAX_REDIRECTS: usize = 5;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// Result of a successful page fetch. All HTTP status codes are "success" here (§4.2) —
/// only transport/TLS/DNS errors surface as `FetchError`.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub html: String,
    pub content_type: Option<String>,
    pub final_url: String,
}

#[derive(Debug, Clone)]
pub struct LinkStatus {
    pub status: u16,
    pub error: Option<String>,
}

type DomainLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP fetcher with per-domain rate limiting, following the teacher's
/// `RateLimitedFetcher` lazy-create-under-lock pattern.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    link_check_client: Client,
    domain_limiters: Arc<RwLock<HashMap<String, Arc<DomainLimiter>>>>,
    rate_per_second: u32,
}

impl HttpFetcher {
    pub fn new(rate_per_second: u32) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .pool_max_idle_per_host(20)
            .build()
            .expect("failed to build HTTP client");

        let link_check_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(LINK_CHECK_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .expect("failed to build link-check client");

        HttpFetcher {
            client,
            link_check_client,
            domain_limiters: Arc::new(RwLock::new(HashMap::new())),
            rate_per_second: rate_per_second.max(1),
        }
    }

    async fn get_limiter(&self, domain: &str) -> Arc<DomainLimiter> {
        {
            let limiters = self.domain_limiters.read().await;
            if let Some(limiter) = limiters.get(domain) {
                return limiter.clone();
            }
        }

        let mut limiters = self.domain_limiters.write().await;
        limiters
            .entry(domain.to_string())
            .or_insert_with(|| {
                let rate = NonZeroU32::new(self.rate_per_second).unwrap();
                Arc::new(RateLimiter::direct(Quota::per_second(rate)))
            })
            .clone()
    }

    async fn wait_for_domain(&self, url: &str) {
        let domain = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        let limiter = self.get_limiter(&domain).await;
        limiter.until_ready().await;
    }

    /// Fetch a page. Every HTTP status code is a successful `FetchResult`;
    /// only transport errors raise (§4.2).
    pub async fn fetch_page(
        &self,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<FetchResult, FetchError> {
        self.wait_for_domain(url).await;

        let mut request = self.client.get(url);
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let html = response.text().await.unwrap_or_default();

        Ok(FetchResult {
            status,
            html,
            content_type,
            final_url,
        })
    }

    /// Check a link's liveness: HEAD first, falling back to GET on 405 (§4.2).
    pub async fn check_link_status(&self, url: &str) -> LinkStatus {
        self.wait_for_domain(url).await;

        match self.link_check_client.head(url).send().await {
            Ok(resp) if resp.status().as_u16() == 405 => {
                match self.link_check_client.get(url).send().await {
                    Ok(resp) => LinkStatus {
                        status: resp.status().as_u16(),
                        error: None,
                    },
                    Err(e) => LinkStatus {
                        status: 0,
                        error: Some(e.to_string()),
                    },
                }
            }
            Ok(resp) => LinkStatus {
                status: resp.status().as_u16(),
                error: None,
            },
            Err(e) => LinkStatus {
                status: 0,
                error: Some(e.to_string()),
            },
        }
    }
}
