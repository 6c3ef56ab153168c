//! Tree Builder (§4.6): turns the flat page list from a crawl into a tree, synthesizing
//! virtual nodes for unvisited path ancestors, detecting canonical duplicates, separating
//! unreachable pages into an orphan list, and building one forest per subdomain.

use crate::models::{CrossLink, LinkEdge, NodeType, PageNode, ScanOptions};
use crate::url_canon;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct TreeOutput {
    pub root: Option<PageNode>,
    pub orphans: Vec<PageNode>,
    pub subdomains: Vec<PageNode>,
    pub crosslinks: Vec<CrossLink>,
}

/// Build the full tree for a scan from its flat page list and the link edges
/// observed while crawling it (§4.6).
pub fn build(pages: Vec<PageNode>, edges: &[LinkEdge], seed_url: &str, options: &ScanOptions) -> TreeOutput {
    let seed_host = match url_canon::base_host(seed_url) {
        Some(h) => h,
        None => return TreeOutput::default(),
    };

    let mut by_host: HashMap<String, Vec<PageNode>> = HashMap::new();
    for page in pages {
        let host = url_canon::base_host(&page.url).unwrap_or_default();
        by_host.entry(host).or_default().push(page);
    }

    let primary_pages = by_host.remove(&seed_host).unwrap_or_default();
    let primary_origin = url_canon::origin_of(seed_url).unwrap_or_else(|| format!("https://{seed_host}"));
    let (root, mut orphans, mut crosslinks) =
        build_group(primary_pages, edges, &format!("{primary_origin}/"));

    let mut subdomain_roots = Vec::new();
    for (host, group_pages) in by_host {
        if group_pages.is_empty() {
            continue;
        }
        let origin = group_pages
            .iter()
            .find_map(|p| url_canon::origin_of(&p.url))
            .unwrap_or_else(|| format!("https://{host}"));
        let (sub_root, sub_orphans, sub_crosslinks) = build_group(group_pages, edges, &format!("{origin}/"));
        if let Some(r) = sub_root {
            subdomain_roots.push(r);
        }
        // Subdomain orphans share the same flat orphan list; the IA persister derives
        // `Placement::SubdomainOrphan` vs `Placement::PrimaryOrphan` from each page's
        // own host, not from which forest it was collected in.
        orphans.extend(sub_orphans);
        crosslinks.extend(sub_crosslinks);
    }

    TreeOutput {
        root,
        orphans: if options.orphan_pages { orphans } else { Vec::new() },
        subdomains: if options.subdomains { subdomain_roots } else { Vec::new() },
        crosslinks: if options.crosslinks { crosslinks } else { Vec::new() },
    }
}

fn build_group(
    nodes: Vec<PageNode>,
    edges: &[LinkEdge],
    group_root_url: &str,
) -> (Option<PageNode>, Vec<PageNode>, Vec<CrossLink>) {
    if nodes.is_empty() {
        return (None, Vec::new(), Vec::new());
    }

    let root_key = match url_canon::canonical_key(group_root_url) {
        Ok(k) => k,
        Err(_) => return (None, Vec::new(), Vec::new()),
    };

    let original_keys: HashSet<String> = nodes
        .iter()
        .filter_map(|n| url_canon::canonical_key(&n.url).ok())
        .collect();

    let key_to_id: HashMap<String, String> = nodes
        .iter()
        .filter_map(|n| url_canon::canonical_key(&n.url).ok().map(|k| (k, n.id.clone())))
        .collect();

    let mut map: HashMap<String, PageNode> = HashMap::new();
    for node in nodes {
        if let Ok(key) = url_canon::canonical_key(&node.url) {
            map.entry(key).or_insert(node);
        }
    }

    mark_duplicates(&mut map);

    if !map.contains_key(&root_key) {
        map.insert(
            root_key.clone(),
            PageNode {
                id: PageNode::id_for(group_root_url),
                url: group_root_url.to_string(),
                final_url: None,
                canonical_url: None,
                title: None,
                parent_url: None,
                referrer_url: None,
                auth_required: false,
                thumbnail_url: None,
                http_status: None,
                is_missing: true,
                was_redirect: false,
                is_duplicate: false,
                duplicate_of: None,
                discovery_index: None,
                discovery_source: crate::models::DiscoverySource::Crawl,
                depth: 0,
                sitemap_order: None,
                children: Vec::new(),
            },
        );
    }

    synthesize_virtual_ancestors(&mut map, &root_key);

    let referrer_adjacency = build_referrer_adjacency(&map, edges);
    let reachable = reachable_from(&root_key, &referrer_adjacency);

    let mut orphans = Vec::new();
    for key in original_keys.iter() {
        if key == &root_key || reachable.contains(key) {
            continue;
        }
        if let Some(node) = map.remove(key) {
            orphans.push(node);
        }
    }

    let crosslinks = detect_crosslinks(&map, &key_to_id, &reachable, &root_key, edges);

    let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in &keys {
        if *key == root_key {
            continue;
        }
        let node = &map[key];
        if let Some(parent_key) = url_canon::parent_url(&node.url).and_then(|p| url_canon::canonical_key(&p).ok())
        {
            if map.contains_key(&parent_key) {
                children_of.entry(parent_key).or_default().push(key.clone());
                continue;
            }
        }
        children_of.entry(root_key.clone()).or_default().push(key.clone());
    }

    let root = attach(&root_key, &mut map, &children_of);
    (root, orphans, crosslinks)
}

fn mark_duplicates(map: &mut HashMap<String, PageNode>) {
    let candidates: Vec<(String, String)> = map
        .iter()
        .filter_map(|(key, node)| {
            let canon = node.canonical_url.as_ref()?;
            let target_key = url_canon::canonical_key(canon).ok()?;
            if &target_key != key {
                Some((key.clone(), target_key))
            } else {
                None
            }
        })
        .collect();

    for (key, target_key) in candidates {
        let duplicate_of = map.get(&target_key).map(|n| n.id.clone());
        if let Some(node) = map.get_mut(&key) {
            node.is_duplicate = true;
            node.duplicate_of = duplicate_of;
        }
    }
}

fn synthesize_virtual_ancestors(map: &mut HashMap<String, PageNode>, root_key: &str) {
    let mut work: VecDeque<String> = map.keys().cloned().collect();
    while let Some(key) = work.pop_front() {
        if key == root_key {
            continue;
        }
        let url = match map.get(&key) {
            Some(n) => n.url.clone(),
            None => continue,
        };
        let parent_url = match url_canon::parent_url(&url) {
            Some(p) => p,
            None => continue,
        };
        let parent_key = match url_canon::canonical_key(&parent_url) {
            Ok(k) => k,
            Err(_) => continue,
        };
        if map.contains_key(&parent_key) {
            continue;
        }
        map.insert(
            parent_key.clone(),
            PageNode {
                id: PageNode::id_for(&parent_url),
                url: parent_url.clone(),
                final_url: None,
                canonical_url: None,
                title: None,
                parent_url: None,
                referrer_url: None,
                auth_required: false,
                thumbnail_url: None,
                http_status: None,
                is_missing: true,
                was_redirect: false,
                is_duplicate: false,
                duplicate_of: None,
                discovery_index: None,
                discovery_source: crate::models::DiscoverySource::Crawl,
                depth: url_canon::depth_of(&parent_url),
                sitemap_order: None,
                children: Vec::new(),
            },
        );
        work.push_back(parent_key);
    }
}

/// Build the referrer graph from the full link-edge set, restricted to edges whose
/// endpoints are both present in this host group's node set (§9: "store edges
/// separately ... a link set keyed by from→to").
fn build_referrer_adjacency(
    map: &HashMap<String, PageNode>,
    edges: &[LinkEdge],
) -> HashMap<String, Vec<String>> {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for edge in edges {
        let from_key = match url_canon::canonical_key(&edge.from) {
            Ok(k) => k,
            Err(_) => continue,
        };
        let to_key = match url_canon::canonical_key(&edge.to) {
            Ok(k) => k,
            Err(_) => continue,
        };
        if map.contains_key(&from_key) && map.contains_key(&to_key) {
            adjacency.entry(from_key).or_default().push(to_key);
        }
    }
    adjacency
}

fn reachable_from(root_key: &str, adjacency: &HashMap<String, Vec<String>>) -> HashSet<String> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(root_key.to_string());
    queue.push_back(root_key.to_string());
    while let Some(key) = queue.pop_front() {
        if let Some(children) = adjacency.get(&key) {
            for child in children {
                if visited.insert(child.clone()) {
                    queue.push_back(child.clone());
                }
            }
        }
    }
    visited
}

/// Emit one cross-link per link-graph edge whose endpoints are both in the node set
/// and which is not a parent/child edge in either direction (§4.6(i)).
fn detect_crosslinks(
    map: &HashMap<String, PageNode>,
    key_to_id: &HashMap<String, String>,
    reachable: &HashSet<String>,
    root_key: &str,
    edges: &[LinkEdge],
) -> Vec<CrossLink> {
    let mut out = Vec::new();
    for edge in edges {
        let from_key = match url_canon::canonical_key(&edge.from) {
            Ok(k) => k,
            Err(_) => continue,
        };
        let to_key = match url_canon::canonical_key(&edge.to) {
            Ok(k) => k,
            Err(_) => continue,
        };
        if to_key == root_key {
            continue;
        }
        if !map.contains_key(&from_key) || !reachable.contains(&from_key) {
            continue;
        }
        let to_node = match map.get(&to_key) {
            Some(n) => n,
            None => continue,
        };

        let to_is_child_of_from = url_canon::parent_url(&to_node.url)
            .and_then(|p| url_canon::canonical_key(&p).ok())
            .as_deref()
            == Some(from_key.as_str());
        if to_is_child_of_from {
            continue;
        }
        let from_node = &map[&from_key];
        let from_is_child_of_to = url_canon::parent_url(&from_node.url)
            .and_then(|p| url_canon::canonical_key(&p).ok())
            .as_deref()
            == Some(to_key.as_str());
        if from_is_child_of_to {
            continue;
        }

        if let Some(source_id) = key_to_id.get(&from_key) {
            out.push(CrossLink {
                source_id: source_id.clone(),
                target_id: to_node.id.clone(),
            });
        }
    }
    out
}

fn attach(
    key: &str,
    map: &mut HashMap<String, PageNode>,
    children_of: &HashMap<String, Vec<String>>,
) -> Option<PageNode> {
    let mut node = map.remove(key)?;
    let mut children: Vec<PageNode> = Vec::new();
    if let Some(child_keys) = children_of.get(key) {
        for child_key in child_keys {
            if let Some(child) = attach(child_key, map, children_of) {
                children.push(child);
            }
        }
    }

    if node.node_type_is_virtual() && children.is_empty() {
        return None;
    }

    sort_children(&mut children);
    node.children = children;
    Some(node)
}

fn sort_children(children: &mut [PageNode]) {
    children.sort_by(|a, b| {
        match (a.sitemap_order, b.sitemap_order) {
            (Some(x), Some(y)) => return x.cmp(&y),
            (Some(_), None) => return std::cmp::Ordering::Less,
            (None, Some(_)) => return std::cmp::Ordering::Greater,
            (None, None) => {}
        }
        subtree_size(b)
            .cmp(&subtree_size(a))
            .then_with(|| a.depth.cmp(&b.depth))
            .then_with(|| {
                let a_title = a.title.clone().unwrap_or_default().to_lowercase();
                let b_title = b.title.clone().unwrap_or_default().to_lowercase();
                a_title.cmp(&b_title)
            })
            .then_with(|| a.url.cmp(&b.url))
    });
}

fn subtree_size(node: &PageNode) -> usize {
    1 + node.children.iter().map(subtree_size).sum::<usize>()
}

impl PageNode {
    fn node_type_is_virtual(&self) -> bool {
        self.title.is_none() && self.http_status.is_none() && self.is_missing && self.discovery_index.is_none()
    }

    pub fn node_type(&self) -> NodeType {
        if self.node_type_is_virtual() {
            NodeType::VirtualNode
        } else {
            NodeType::Page
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscoverySource, PageNode};

    /// Test helper: derive the edge set implied by each page's recorded referrer,
    /// standing in for the crawler's own `CrawlOutput::edges`.
    fn edges_from(pages: &[PageNode]) -> Vec<LinkEdge> {
        pages
            .iter()
            .filter_map(|p| {
                p.referrer_url
                    .as_ref()
                    .map(|r| LinkEdge { from: r.clone(), to: p.url.clone() })
            })
            .collect()
    }

    fn page(url: &str, parent: Option<&str>, referrer: Option<&str>, depth: u32) -> PageNode {
        PageNode {
            id: PageNode::id_for(url),
            url: url.to_string(),
            final_url: Some(url.to_string()),
            canonical_url: None,
            title: Some(url.to_string()),
            parent_url: parent.map(|s| s.to_string()),
            referrer_url: referrer.map(|s| s.to_string()),
            auth_required: false,
            thumbnail_url: None,
            http_status: Some(200),
            was_redirect: false,
            is_missing: false,
            is_duplicate: false,
            duplicate_of: None,
            discovery_index: Some(0),
            discovery_source: DiscoverySource::Crawl,
            depth,
            sitemap_order: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_builds_simple_tree() {
        let pages = vec![
            page("https://example.com/", None, None, 0),
            page("https://example.com/about", Some("https://example.com/"), Some("https://example.com/"), 1),
        ];
        let options = ScanOptions::default();
        let edges = edges_from(&pages);
        let output = build(pages, &edges, "https://example.com/", &options);
        let root = output.root.unwrap();
        assert_eq!(root.url, "https://example.com/");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].url, "https://example.com/about");
    }

    #[test]
    fn test_synthesizes_virtual_ancestor() {
        let pages = vec![
            page("https://example.com/", None, None, 0),
            page(
                "https://example.com/blog/post-1",
                Some("https://example.com/blog"),
                Some("https://example.com/"),
                2,
            ),
        ];
        let options = ScanOptions::default();
        let edges = edges_from(&pages);
        let output = build(pages, &edges, "https://example.com/", &options);
        let root = output.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].url, "https://example.com/blog");
        assert!(root.children[0].node_type_is_virtual());
        assert_eq!(root.children[0].children[0].url, "https://example.com/blog/post-1");
    }

    #[test]
    fn test_unreachable_page_becomes_orphan() {
        let pages = vec![
            page("https://example.com/", None, None, 0),
            page("https://example.com/secret", None, None, 1),
        ];
        let mut options = ScanOptions::default();
        options.orphan_pages = true;
        let edges = edges_from(&pages);
        let output = build(pages, &edges, "https://example.com/", &options);
        assert_eq!(output.orphans.len(), 1);
        assert_eq!(output.orphans[0].url, "https://example.com/secret");
    }

    #[test]
    fn test_canonical_duplicate_marked() {
        let mut dup = page("https://example.com/a?x=1", Some("https://example.com/"), Some("https://example.com/"), 1);
        dup.canonical_url = Some("https://example.com/a".to_string());
        let pages = vec![
            page("https://example.com/", None, None, 0),
            page("https://example.com/a", Some("https://example.com/"), Some("https://example.com/"), 1),
            dup,
        ];
        let options = ScanOptions::default();
        let edges = edges_from(&pages);
        let output = build(pages, &edges, "https://example.com/", &options);
        let root = output.root.unwrap();
        let dup_node = root.children.iter().find(|c| c.url.contains("x=1")).unwrap();
        assert!(dup_node.is_duplicate);
    }

    #[test]
    fn test_crosslink_detected_when_referrer_differs_from_path_parent() {
        let pages = vec![
            page("https://example.com/", None, None, 0),
            page("https://example.com/a", Some("https://example.com/"), Some("https://example.com/"), 1),
            page("https://example.com/a/b", Some("https://example.com/a"), Some("https://example.com/"), 2),
        ];
        let mut options = ScanOptions::default();
        options.crosslinks = true;
        let edges = edges_from(&pages);
        let output = build(pages, &edges, "https://example.com/", &options);
        assert_eq!(output.crosslinks.len(), 1);
    }

    #[test]
    fn test_sort_places_higher_sitemap_order_last() {
        let mut a = page("https://example.com/a", Some("https://example.com/"), Some("https://example.com/"), 1);
        a.sitemap_order = Some(1);
        let mut b = page("https://example.com/b", Some("https://example.com/"), Some("https://example.com/"), 1);
        b.sitemap_order = Some(0);
        let pages = vec![page("https://example.com/", None, None, 0), a, b];
        let options = ScanOptions::default();
        let edges = edges_from(&pages);
        let output = build(pages, &edges, "https://example.com/", &options);
        let root = output.root.unwrap();
        assert_eq!(root.children[0].url, "https://example.com/b");
        assert_eq!(root.children[1].url, "https://example.com/a");
    }
}
