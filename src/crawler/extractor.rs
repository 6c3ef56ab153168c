//! Link Extractor (§4.3) — anchors, canonical/alternate `link` tags, data-attribute
//! hrefs, title/canonical/thumbnail hints.

use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "pdf", "zip", "mp4", "mov", "mp3", "wav",
];

const THUMBNAIL_SELECTORS: &[&str] = &[
    r#"meta[property="og:image"]"#,
    r#"meta[name="twitter:image"]"#,
    r#"meta[itemprop="image"]"#,
];

#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub links: Vec<String>,
    pub title: Option<String>,
    pub canonical_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Extract the deduplicated set of absolute URLs and the page hints described in §4.3.
pub fn extract(html: &str, base_url: &str) -> ExtractedPage {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut seen = BTreeSet::new();
    let mut links = Vec::new();
    let mut push = |resolved: Option<Url>| {
        if let Some(u) = resolved {
            if u.scheme() == "http" || u.scheme() == "https" {
                let s = u.to_string();
                if seen.insert(s.clone()) {
                    links.push(s);
                }
            }
        }
    };

    if let Ok(sel) = Selector::parse("a[href]") {
        for el in document.select(&sel) {
            if let Some(href) = el.value().attr("href") {
                if is_excluded_scheme(href) {
                    continue;
                }
                push(resolve(&base, href));
            }
        }
    }

    if let Ok(sel) = Selector::parse("link[href]") {
        for el in document.select(&sel) {
            let rel = el.value().attr("rel").unwrap_or("");
            if rel == "canonical" || rel == "alternate" {
                if let Some(href) = el.value().attr("href") {
                    push(resolve(&base, href));
                }
            }
        }
    }

    for attr in ["data-href", "data-url", "data-link"] {
        let selector_str = format!("[{attr}]");
        if let Ok(sel) = Selector::parse(&selector_str) {
            for el in document.select(&sel) {
                if let Some(href) = el.value().attr(attr) {
                    push(resolve(&base, href));
                }
            }
        }
    }

    ExtractedPage {
        links,
        title: extract_title(&document),
        canonical_url: extract_canonical(&document, &base),
        thumbnail_url: extract_thumbnail(&document, &base),
    }
}

/// Classify a link as an asset by its file extension (§4.5).
pub fn is_asset_link(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(|s| s.to_string())))
        .and_then(|last| last.rsplit('.').next().map(|ext| ext.to_lowercase()))
        .map(|ext| ASSET_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn is_excluded_scheme(href: &str) -> bool {
    let lower = href.trim().to_lowercase();
    lower.starts_with("mailto:") || lower.starts_with("tel:") || lower.starts_with("javascript:")
}

fn resolve(base: &Option<Url>, href: &str) -> Option<Url> {
    match base {
        Some(b) => b.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    if let Ok(sel) = Selector::parse("title") {
        if let Some(el) = document.select(&sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    if let Ok(sel) = Selector::parse("h1") {
        if let Some(el) = document.select(&sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    None
}

/// Fallback title humanization from the last path segment, used by callers
/// when the page itself produced neither a `<title>` nor an `<h1>`.
pub fn humanize_path_tail(url: &str) -> String {
    let tail = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(|s| s.to_string())))
        .unwrap_or_default();
    if tail.is_empty() {
        return "Home".to_string();
    }
    tail.replace(['-', '_'], " ")
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_canonical(document: &Html, base: &Option<Url>) -> Option<String> {
    let sel = Selector::parse(r#"link[rel="canonical"]"#).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve(base, href))
        .map(|u| u.to_string())
}

fn extract_thumbnail(document: &Html, base: &Option<Url>) -> Option<String> {
    for selector_str in THUMBNAIL_SELECTORS {
        if let Ok(sel) = Selector::parse(selector_str) {
            if let Some(el) = document.select(&sel).next() {
                if let Some(content) = el.value().attr("content") {
                    if let Some(resolved) = resolve(base, content) {
                        if is_acceptable_thumbnail(resolved.as_str()) {
                            return Some(resolved.to_string());
                        }
                    }
                }
            }
        }
    }

    for (selector_str, attr) in [("img[src]", "src"), ("[data-src]", "data-src")] {
        if let Ok(sel) = Selector::parse(selector_str) {
            for el in document.select(&sel) {
                if let Some(src) = el.value().attr(attr) {
                    if let Some(resolved) = resolve(base, src) {
                        if is_acceptable_thumbnail(resolved.as_str()) {
                            return Some(resolved.to_string());
                        }
                    }
                }
            }
        }
    }

    None
}

fn is_acceptable_thumbnail(url: &str) -> bool {
    if url.starts_with("data:") {
        return false;
    }
    let lower = url.to_lowercase();
    if lower.contains("favicon") || lower.contains("/icon") {
        return false;
    }
    !(lower.ends_with(".svg") || lower.ends_with(".ico"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_anchor_links() {
        let html = r#"<a href="/a">A</a><a href="https://other.com/b">B</a>"#;
        let result = extract(html, "https://example.com/");
        assert!(result.links.contains(&"https://example.com/a".to_string()));
        assert!(result.links.contains(&"https://other.com/b".to_string()));
    }

    #[test]
    fn test_excludes_special_schemes() {
        let html = r#"<a href="mailto:a@b.com">mail</a><a href="tel:123">tel</a><a href="javascript:void(0)">js</a>"#;
        let result = extract(html, "https://example.com/");
        assert!(result.links.is_empty());
    }

    #[test]
    fn test_extracts_data_attrs() {
        let html = r#"<div data-href="/x" data-url="/y" data-link="/z"></div>"#;
        let result = extract(html, "https://example.com/");
        assert_eq!(result.links.len(), 3);
    }

    #[test]
    fn test_extracts_canonical_link_tag() {
        let html = r#"<link rel="canonical" href="https://example.com/real">"#;
        let result = extract(html, "https://example.com/copy");
        assert_eq!(result.canonical_url.as_deref(), Some("https://example.com/real"));
    }

    #[test]
    fn test_dedup_links() {
        let html = r#"<a href="/a">one</a><a href="/a">two</a>"#;
        let result = extract(html, "https://example.com/");
        assert_eq!(result.links.len(), 1);
    }

    #[test]
    fn test_title_fallback_to_h1() {
        let html = "<html><body><h1>Fallback Title</h1></body></html>";
        let result = extract(html, "https://example.com/");
        assert_eq!(result.title.as_deref(), Some("Fallback Title"));
    }

    #[test]
    fn test_thumbnail_rejects_svg_and_favicon() {
        let html = r#"<img src="/favicon.ico"><img src="/photo.svg"><img src="/photo.png">"#;
        let result = extract(html, "https://example.com/");
        assert_eq!(result.thumbnail_url.as_deref(), Some("https://example.com/photo.png"));
    }

    #[test]
    fn test_is_asset_link() {
        assert!(is_asset_link("https://example.com/file.PDF"));
        assert!(is_asset_link("https://example.com/img.jpg"));
        assert!(!is_asset_link("https://example.com/page"));
    }

    #[test]
    fn test_humanize_path_tail() {
        assert_eq!(humanize_path_tail("https://example.com/about-us"), "About Us");
        assert_eq!(humanize_path_tail("https://example.com/"), "Home");
    }
}
