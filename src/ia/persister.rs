//! IA Persister (§4.7): idempotent upsert of page nodes into the durable page store,
//! computing placement and severity, enforcing the virtual→page promotion rule and the
//! discovery-source non-downgrade rule, and accumulating `links_in` across rescans.

use crate::ia::store::{PageStore, StoreError};
use crate::models::{
    DiscoverySource, LinkEdge, NodeType, PageNode, PageRow, PageStatus, Placement, Severity,
};
use crate::url_canon;
use chrono::Utc;
use std::collections::HashMap;

pub struct Persister<'a> {
    store: &'a PageStore,
}

impl<'a> Persister<'a> {
    pub fn new(store: &'a PageStore) -> Self {
        Persister { store }
    }

    /// Persist every page in a flattened scan result against `base_host`. All writes for
    /// a scan are issued inside a single SQLite transaction (§4.7, last paragraph).
    pub async fn persist_scan(
        &self,
        pages: &[PageNode],
        edges: &[LinkEdge],
        base_host: &str,
    ) -> Result<(), StoreError> {
        let links_in = count_links_in(edges);

        let mut tx = self.store.pool().begin().await?;

        for page in pages {
            self.persist_one(&mut tx, page, base_host, &links_in).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn persist_one(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        page: &PageNode,
        base_host: &str,
        links_in: &HashMap<String, i64>,
    ) -> Result<(), StoreError> {
        let key = match url_canon::canonical_key(&page.url) {
            Ok(k) => k,
            Err(_) => return Ok(()),
        };

        let host = url_canon::base_host(&page.url).unwrap_or_default();
        let placement = match classify_placement(&host, base_host) {
            Some(p) => p,
            None => return Ok(()),
        };

        let status = classify_status(page);
        let node_type = if is_virtual(page) {
            NodeType::VirtualNode
        } else {
            NodeType::Page
        };

        let incoming = links_in.get(&key).copied().unwrap_or(0);
        let existing = sqlx::query_as::<_, PageRow>("SELECT * FROM pages WHERE url = ?")
            .bind(&page.url)
            .fetch_optional(&mut *tx)
            .await?;

        let effective_placement =
            if page.discovery_source == DiscoverySource::Sitemap && incoming == 0 {
                placement.as_orphan()
            } else {
                placement
            };

        let severity = severity_of(effective_placement, status);

        let (final_node_type, final_discovery_source, final_links_in) = match &existing {
            Some(row) => {
                let existing_is_page = row.node_type == NodeType::Page.as_str();
                let merged_type = if existing_is_page {
                    NodeType::Page
                } else {
                    node_type
                };
                let existing_source = row.discovery_source.as_str();
                let merged_source = if existing_source == DiscoverySource::Crawl.as_str() {
                    DiscoverySource::Crawl
                } else {
                    page.discovery_source
                };
                (merged_type, merged_source, row.links_in + incoming)
            }
            None => (node_type, page.discovery_source, incoming),
        };

        let now = Utc::now();
        let created_at = existing.as_ref().map(|r| r.created_at).unwrap_or(now);

        let row = PageRow {
            url: page.url.clone(),
            title: page.title.clone(),
            status: status.as_str().to_string(),
            node_type: final_node_type.as_str().to_string(),
            placement: effective_placement.as_str().to_string(),
            parent_url: page.parent_url.clone(),
            depth: page.depth as i64,
            discovery_source: final_discovery_source.as_str().to_string(),
            links_in: final_links_in,
            severity: severity.as_str().to_string(),
            created_at,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO pages (url, title, status, type, placement, parent_url, depth,
                                discovery_source, links_in, severity, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                type = excluded.type,
                placement = excluded.placement,
                parent_url = excluded.parent_url,
                depth = excluded.depth,
                discovery_source = excluded.discovery_source,
                links_in = excluded.links_in,
                severity = excluded.severity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.url)
        .bind(&row.title)
        .bind(&row.status)
        .bind(&row.node_type)
        .bind(&row.placement)
        .bind(&row.parent_url)
        .bind(row.depth)
        .bind(&row.discovery_source)
        .bind(row.links_in)
        .bind(&row.severity)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;

        self.backfill_ancestors(tx, &page.url).await?;

        Ok(())
    }

    /// Ensure every path-ancestor of a persisted URL exists as a Virtual Node row (§4.7).
    async fn backfill_ancestors(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        url: &str,
    ) -> Result<(), StoreError> {
        let mut current = url.to_string();
        while let Some(parent) = url_canon::parent_url(&current) {
            let existing = sqlx::query_as::<_, PageRow>("SELECT * FROM pages WHERE url = ?")
                .bind(&parent)
                .fetch_optional(&mut *tx)
                .await?;
            if existing.is_some() {
                break;
            }

            let now = Utc::now();
            let title = crate::crawler::extractor::humanize_path_tail(&parent);
            sqlx::query(
                r#"
                INSERT INTO pages (url, title, status, type, placement, parent_url, depth,
                                    discovery_source, links_in, severity, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
                ON CONFLICT(url) DO NOTHING
                "#,
            )
            .bind(&parent)
            .bind(title)
            .bind(PageStatus::Missing.as_str())
            .bind(NodeType::VirtualNode.as_str())
            .bind(Placement::Primary.as_str())
            .bind(url_canon::parent_url(&parent))
            .bind(url_canon::depth_of(&parent) as i64)
            .bind(DiscoverySource::Crawl.as_str())
            .bind(Severity::Medium.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            current = parent;
        }
        Ok(())
    }
}

fn is_virtual(page: &PageNode) -> bool {
    page.title.is_none() && page.http_status.is_none() && page.is_missing && page.discovery_index.is_none()
}

fn classify_status(page: &PageNode) -> PageStatus {
    if is_virtual(page) {
        return PageStatus::Missing;
    }
    match page.http_status {
        Some(code) if (200..300).contains(&code) => {
            if page.was_redirect {
                PageStatus::Redirect
            } else {
                PageStatus::Active
            }
        }
        Some(code) if (300..400).contains(&code) => PageStatus::Redirect,
        Some(code) if code >= 400 => PageStatus::Error,
        _ => PageStatus::Missing,
    }
}

fn classify_placement(host: &str, base_host: &str) -> Option<Placement> {
    if host == base_host {
        return Some(Placement::Primary);
    }
    if host.ends_with(&format!(".{base_host}")) {
        return Some(Placement::Subdomain);
    }
    None
}

fn severity_of(placement: Placement, status: PageStatus) -> Severity {
    if placement == Placement::SubdomainOrphan && status == PageStatus::Active {
        return Severity::SecurityRisk;
    }
    match status {
        PageStatus::Error => Severity::Critical,
        PageStatus::Redirect => Severity::Warning,
        _ => match placement {
            Placement::PrimaryOrphan => Severity::High,
            _ if status == PageStatus::Missing => Severity::Medium,
            _ => Severity::Healthy,
        },
    }
}

/// Count distinct `from → to` edges observed this run, keyed by the target's canonical key.
fn count_links_in(edges: &[LinkEdge]) -> HashMap<String, i64> {
    let mut counts = HashMap::new();
    for edge in edges {
        if let Ok(key) = url_canon::canonical_key(&edge.to) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscoverySource;

    #[test]
    fn test_classify_placement() {
        assert_eq!(classify_placement("example.com", "example.com"), Some(Placement::Primary));
        assert_eq!(classify_placement("blog.example.com", "example.com"), Some(Placement::Subdomain));
        assert_eq!(classify_placement("other.com", "example.com"), None);
    }

    #[test]
    fn test_severity_rules() {
        assert_eq!(severity_of(Placement::SubdomainOrphan, PageStatus::Active), Severity::SecurityRisk);
        assert_eq!(severity_of(Placement::Primary, PageStatus::Error), Severity::Critical);
        assert_eq!(severity_of(Placement::Primary, PageStatus::Redirect), Severity::Warning);
        assert_eq!(severity_of(Placement::PrimaryOrphan, PageStatus::Active), Severity::High);
        assert_eq!(severity_of(Placement::Primary, PageStatus::Missing), Severity::Medium);
        assert_eq!(severity_of(Placement::Primary, PageStatus::Active), Severity::Healthy);
    }

    fn sample_page() -> PageNode {
        PageNode {
            id: PageNode::id_for("https://example.com/a"),
            url: "https://example.com/a".to_string(),
            final_url: Some("https://example.com/a".to_string()),
            canonical_url: None,
            title: Some("A".to_string()),
            parent_url: Some("https://example.com/".to_string()),
            referrer_url: None,
            auth_required: false,
            thumbnail_url: None,
            http_status: Some(200),
            was_redirect: false,
            is_missing: false,
            is_duplicate: false,
            duplicate_of: None,
            discovery_index: Some(0),
            discovery_source: DiscoverySource::Crawl,
            depth: 1,
            sitemap_order: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_count_links_in() {
        let edges = vec![
            LinkEdge {
                from: "https://example.com/".to_string(),
                to: "https://example.com/a".to_string(),
            },
            LinkEdge {
                from: "https://example.com/b".to_string(),
                to: "https://example.com/a".to_string(),
            },
            LinkEdge {
                from: "https://example.com/c".to_string(),
                to: "https://example.com/a".to_string(),
            },
        ];
        let counts = count_links_in(&edges);
        assert_eq!(counts.len(), 1);
        let key = url_canon::canonical_key("https://example.com/a").unwrap();
        assert_eq!(counts.get(&key).copied(), Some(3));
    }

    #[test]
    fn test_classify_status_virtual_is_missing() {
        let mut page = sample_page();
        page.title = None;
        page.http_status = None;
        page.is_missing = true;
        page.discovery_index = None;
        assert_eq!(classify_status(&page), PageStatus::Missing);
    }
}
