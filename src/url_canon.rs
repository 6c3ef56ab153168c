//! URL normalization, canonical-key generation, and parent-URL derivation (§3.1, §4.1).

use url::Url;

const INDEX_SUFFIXES: &[&str] = &["index.html", "index.htm", "index.php", "index.aspx"];

const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "ref", "ref_src", "mkt_tok", "mc_cid", "mc_eid"];

#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Invalid(String),
}

/// Normalize a URL per §3.1: strip fragment, lower-case host, strip leading `www.`,
/// collapse trailing `index.*`, strip trailing slash (unless path is `/`).
pub fn canonicalize(raw: &str) -> Result<Url, UrlError> {
    let mut parsed = Url::parse(raw).map_err(|e| UrlError::Invalid(e.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(UrlError::Invalid(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        )));
    }
    parsed.set_fragment(None);

    if let Some(host) = parsed.host_str() {
        let lower = host.to_lowercase();
        let stripped = lower.strip_prefix("www.").unwrap_or(&lower).to_string();
        let _ = parsed.set_host(Some(&stripped));
    }

    let mut path = parsed.path().to_string();
    for suffix in INDEX_SUFFIXES {
        if let Some(stripped) = path.strip_suffix(suffix) {
            path = stripped.to_string();
            break;
        }
    }
    if path.len() > 1 && path.ends_with('/') {
        path.truncate(path.len() - 1);
    }
    if path.is_empty() {
        path = "/".to_string();
    }
    parsed.set_path(&path);

    Ok(parsed)
}

/// Canonical key: `host[:port]/path[?query]` with tracking params stripped (§3.1).
pub fn canonical_key(raw: &str) -> Result<String, UrlError> {
    let normalized = canonicalize(raw)?;
    let host = normalized
        .host_str()
        .ok_or_else(|| UrlError::Invalid("missing host".to_string()))?;
    let mut key = host.to_string();
    if let Some(port) = normalized.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(normalized.path());

    let kept: Vec<String> = normalized
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| {
            if value.is_empty() {
                name.to_string()
            } else {
                format!("{name}={value}")
            }
        })
        .collect();
    if !kept.is_empty() {
        key.push('?');
        key.push_str(&kept.join("&"));
    }

    Ok(key)
}

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Derive the path-based parent URL: drop the last path segment. `None` for origin roots.
pub fn parent_url(raw: &str) -> Option<String> {
    let normalized = canonicalize(raw).ok()?;
    let path = normalized.path();
    if path == "/" {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let mut parent = normalized.clone();
    let parent_path = if idx == 0 { "/" } else { &trimmed[..idx] };
    parent.set_path(parent_path);
    parent.set_query(None);
    Some(parent.to_string())
}

/// Depth relative to origin root: number of non-empty path segments.
pub fn depth_of(raw: &str) -> u32 {
    match canonicalize(raw) {
        Ok(u) => u
            .path_segments()
            .map(|segs| segs.filter(|s| !s.is_empty()).count() as u32)
            .unwrap_or(0),
        Err(_) => 0,
    }
}

/// Lower-cased host with leading `www.` stripped — the "base host" (GLOSSARY).
pub fn base_host(raw: &str) -> Option<String> {
    let u = Url::parse(raw).ok()?;
    let host = u.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Registrable root domain approximation used for subdomain host admission (§4.5).
/// Last two labels, or last three when the penultimate label is <=3 chars
/// (approximates `co.uk`-style TLDs).
pub fn registrable_root(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return host.to_string();
    }
    let take = if labels.len() >= 3 && labels[labels.len() - 2].len() <= 3 {
        3
    } else {
        2
    };
    let take = take.min(labels.len());
    labels[labels.len() - take..].join(".")
}

/// Same-host check with `www.` normalization (§4.6(c)).
pub fn same_host(a: &str, b: &str) -> bool {
    match (base_host(a), base_host(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub fn origin_of(raw: &str) -> Option<String> {
    let u = Url::parse(raw).ok()?;
    let host = u.host_str()?;
    Some(match u.port() {
        Some(p) => format!("{}://{}:{}", u.scheme(), host, p),
        None => format!("{}://{}", u.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent() {
        let once = canonicalize("https://WWW.Example.com/a/index.html?utm_source=x").unwrap();
        let twice = canonicalize(once.as_str()).unwrap();
        assert_eq!(once.as_str(), twice.as_str());
    }

    #[test]
    fn test_canonical_key_equivalence() {
        let a = canonical_key("https://WWW.Example.com/a/?utm_source=x").unwrap();
        let b = canonical_key("https://example.com/a").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_strips_index_html() {
        let u = canonicalize("https://example.com/blog/index.html").unwrap();
        assert_eq!(u.path(), "/blog");
    }

    #[test]
    fn test_trailing_slash_preserved_for_root() {
        let u = canonicalize("https://example.com/").unwrap();
        assert_eq!(u.path(), "/");
    }

    #[test]
    fn test_tracking_params_removed_others_kept() {
        let key = canonical_key("https://example.com/a?utm_campaign=x&id=5&gclid=y").unwrap();
        assert_eq!(key, "example.com/a?id=5");
    }

    #[test]
    fn test_parent_url() {
        assert_eq!(
            parent_url("https://example.com/a/b/c").as_deref(),
            Some("https://example.com/a/b")
        );
        assert_eq!(parent_url("https://example.com/a").as_deref(), Some("https://example.com/"));
        assert_eq!(parent_url("https://example.com/"), None);
    }

    #[test]
    fn test_registrable_root() {
        assert_eq!(registrable_root("www.example.com"), "example.com");
        assert_eq!(registrable_root("shop.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_root("example.com"), "example.com");
    }

    #[test]
    fn test_same_host_www_normalization() {
        assert!(same_host("https://www.example.com/a", "https://example.com/b"));
        assert!(!same_host("https://example.com/a", "https://other.com/b"));
    }
}
