//! Per-client-IP rate limiting (§5) for the scan and screenshot endpoints, following the
//! same lazy-create-under-lock governor pattern as the crawler's per-domain fetch limiter.

use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

type ClientLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// One token bucket per client IP, replenished at a fixed per-minute rate.
pub struct IpRateLimiter {
    buckets: Arc<RwLock<HashMap<IpAddr, Arc<ClientLimiter>>>>,
    per_minute: u32,
}

impl IpRateLimiter {
    pub fn new(per_minute: u32) -> Self {
        IpRateLimiter {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            per_minute: per_minute.max(1),
        }
    }

    async fn bucket_for(&self, ip: IpAddr) -> Arc<ClientLimiter> {
        {
            let buckets = self.buckets.read().await;
            if let Some(limiter) = buckets.get(&ip) {
                return limiter.clone();
            }
        }

        let mut buckets = self.buckets.write().await;
        buckets
            .entry(ip)
            .or_insert_with(|| {
                let rate = NonZeroU32::new(self.per_minute).unwrap();
                Arc::new(RateLimiter::direct(Quota::per_minute(rate)))
            })
            .clone()
    }

    /// Returns `true` if the request is admitted, `false` if the client is over quota.
    pub async fn check(&self, ip: IpAddr) -> bool {
        self.bucket_for(ip).await.check().is_ok()
    }
}
