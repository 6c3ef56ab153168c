//! Host Safety Oracle (§4.1) — rejects SSRF-prone URLs before they are ever fetched.

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("blocked host: {0}")]
    BlockedHost(String),
    #[error("DNS resolution failed for {0}")]
    ResolutionFailed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct HostSafety {
    /// Development-only switch that disables the private-IP check entirely (§4.1).
    pub relax_ip_checks: bool,
}

impl HostSafety {
    pub fn new(relax_ip_checks: bool) -> Self {
        HostSafety { relax_ip_checks }
    }

    /// Validate and return a safe URL string suitable for subsequent fetches.
    pub async fn assert_safe(&self, raw_url: &str) -> Result<String, SafetyError> {
        let parsed = Url::parse(raw_url).map_err(|e| SafetyError::InvalidUrl(e.to_string()))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SafetyError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| SafetyError::InvalidUrl("missing host".to_string()))?;

        if is_blocked_hostname(host) {
            return Err(SafetyError::BlockedHost(host.to_string()));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            if !self.relax_ip_checks && is_private_ip(ip) {
                return Err(SafetyError::BlockedHost(host.to_string()));
            }
            return Ok(raw_url.to_string());
        }

        // Named host: resolve via DNS and check every address.
        if self.relax_ip_checks {
            return Ok(raw_url.to_string());
        }

        let lookup_host = format!("{}:0", host);
        let addrs = tokio::net::lookup_host(&lookup_host)
            .await
            .map_err(|_| SafetyError::ResolutionFailed(host.to_string()))?
            .collect::<Vec<_>>();

        if addrs.is_empty() {
            return Err(SafetyError::ResolutionFailed(host.to_string()));
        }

        for addr in &addrs {
            if is_private_ip(addr.ip()) {
                return Err(SafetyError::BlockedHost(host.to_string()));
            }
        }

        Ok(raw_url.to_string())
    }
}

fn is_blocked_hostname(host: &str) -> bool {
    let lower = host.to_lowercase();
    lower == "localhost" || lower.ends_with(".localhost") || lower.ends_with(".local")
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] >= 224 // reserved/multicast block, belt-and-suspenders
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() {
                return true;
            }
            let segments = v6.segments();
            // fc00::/7 (unique local)
            if (segments[0] & 0xfe00) == 0xfc00 {
                return true;
            }
            // fe80::/10 (link-local)
            if (segments[0] & 0xffc0) == 0xfe80 {
                return true;
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_loopback_literal() {
        let safety = HostSafety::new(false);
        let result = safety.assert_safe("http://127.0.0.1/").await;
        assert!(matches!(result, Err(SafetyError::BlockedHost(_))));
    }

    #[tokio::test]
    async fn test_rejects_localhost_name() {
        let safety = HostSafety::new(false);
        let result = safety.assert_safe("http://localhost/").await;
        assert!(matches!(result, Err(SafetyError::BlockedHost(_))));
    }

    #[tokio::test]
    async fn test_rejects_dot_local() {
        let safety = HostSafety::new(false);
        let result = safety.assert_safe("http://printer.local/").await;
        assert!(matches!(result, Err(SafetyError::BlockedHost(_))));
    }

    #[tokio::test]
    async fn test_rejects_private_ipv4() {
        let safety = HostSafety::new(false);
        for ip in ["10.0.0.5", "172.16.0.1", "192.168.1.1", "169.254.1.1"] {
            let url = format!("http://{ip}/");
            let result = safety.assert_safe(&url).await;
            assert!(result.is_err(), "{ip} should be blocked");
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_scheme() {
        let safety = HostSafety::new(false);
        let result = safety.assert_safe("ftp://example.com/").await;
        assert!(matches!(result, Err(SafetyError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_relax_switch_allows_private_ip() {
        let safety = HostSafety::new(true);
        let result = safety.assert_safe("http://127.0.0.1/").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_ipv6_loopback() {
        let safety = HostSafety::new(false);
        let result = safety.assert_safe("http://[::1]/").await;
        assert!(result.is_err());
    }
}
