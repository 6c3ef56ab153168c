use serde::{Deserialize, Serialize};

/// Boolean scan options (§4.5/§9 "duck typing" — absent fields default false).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanOptions {
    pub thumbnails: bool,
    pub inactive_pages: bool,
    pub subdomains: bool,
    pub authenticated_pages: bool,
    pub orphan_pages: bool,
    pub error_pages: bool,
    pub broken_links: bool,
    pub duplicates: bool,
    pub files: bool,
    pub crosslinks: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub options: ScanOptions,
}

fn default_max_pages() -> u32 {
    200
}

fn default_max_depth() -> u32 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Active,
    Redirect,
    Error,
    Missing,
}

impl PageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PageStatus::Active => "Active",
            PageStatus::Redirect => "Redirect",
            PageStatus::Error => "Error",
            PageStatus::Missing => "Missing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Page,
    #[serde(rename = "Virtual Node")]
    VirtualNode,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Page => "Page",
            NodeType::VirtualNode => "Virtual Node",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Primary,
    Subdomain,
    #[serde(rename = "Primary Orphan")]
    PrimaryOrphan,
    #[serde(rename = "Subdomain Orphan")]
    SubdomainOrphan,
}

impl Placement {
    pub fn as_orphan(self) -> Placement {
        match self {
            Placement::Primary => Placement::PrimaryOrphan,
            Placement::Subdomain => Placement::SubdomainOrphan,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Placement::Primary => "Primary",
            Placement::Subdomain => "Subdomain",
            Placement::PrimaryOrphan => "Primary Orphan",
            Placement::SubdomainOrphan => "Subdomain Orphan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Healthy,
    Warning,
    Medium,
    High,
    Critical,
    #[serde(rename = "Security Risk")]
    SecurityRisk,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Healthy => "Healthy",
            Severity::Warning => "Warning",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
            Severity::SecurityRisk => "Security Risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Crawl,
    Sitemap,
}

impl DiscoverySource {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscoverySource::Crawl => "crawl",
            DiscoverySource::Sitemap => "sitemap",
        }
    }
}

/// A page node as tracked in-memory during a scan (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNode {
    pub id: String,
    pub url: String,
    pub final_url: Option<String>,
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub parent_url: Option<String>,
    pub referrer_url: Option<String>,
    pub auth_required: bool,
    pub thumbnail_url: Option<String>,
    pub http_status: Option<u16>,
    pub was_redirect: bool,
    pub is_missing: bool,
    pub is_duplicate: bool,
    pub duplicate_of: Option<String>,
    pub discovery_index: Option<u32>,
    pub discovery_source: DiscoverySource,
    pub depth: u32,
    #[serde(default)]
    pub sitemap_order: Option<u32>,
    #[serde(default)]
    pub children: Vec<PageNode>,
}

impl PageNode {
    /// Stable node id: base64 of the URL with non-alphanumerics stripped, `n_` prefixed (§3.2).
    pub fn id_for(url: &str) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(url.as_bytes());
        let stripped: String = encoded.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        format!("n_{stripped}")
    }
}

/// A directed edge observed during link extraction: `from` linked to `to` (§4.5, §9
/// "store edges separately ... a link set keyed by from→to"). Internal to a scan, not
/// part of the wire-facing `ScanResult`.
#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossLink {
    pub source_id: String,
    pub target_id: String,
}

/// The tuple returned by a scan (§3.3). Each list is present iff its option flag was set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub root: Option<PageNode>,
    #[serde(default)]
    pub orphans: Vec<PageNode>,
    #[serde(default)]
    pub subdomains: Vec<PageNode>,
    #[serde(default)]
    pub errors: Vec<PageNode>,
    #[serde(default)]
    pub inactive_pages: Vec<PageNode>,
    #[serde(default)]
    pub broken_links: Vec<BrokenLink>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub crosslinks: Vec<CrossLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub url: String,
    pub source_url: Option<String>,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub url: String,
    pub source_url: Option<String>,
    pub content_type: Option<String>,
}

/// Progress snapshot emitted during a scan (§4.5, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub scanned: u32,
    pub queued: u32,
}

// --- Persisted rows (§3.4/§3.5) ---

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageRow {
    pub url: String,
    pub title: Option<String>,
    pub status: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub node_type: String,
    pub placement: String,
    pub parent_url: Option<String>,
    pub depth: i64,
    pub discovery_source: String,
    pub links_in: i64,
    pub severity: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Scan,
    Screenshot,
    Discovery,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Scan => "scan",
            JobType::Screenshot => "screenshot",
            JobType::Discovery => "discovery",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(JobType::Scan),
            "screenshot" => Ok(JobType::Screenshot),
            "discovery" => Ok(JobType::Discovery),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Complete,
    Failed,
    Canceled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Failed | JobState::Canceled
        )
    }
}

impl std::str::FromStr for JobState {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "complete" => Ok(JobState::Complete),
            "failed" => Ok(JobState::Failed),
            "canceled" => Ok(JobState::Canceled),
            _ => Err(()),
        }
    }
}

/// Owner triple for a job (§3.5): user id, API key, IP hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOwner {
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub ip_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
    pub id: String,
    pub job_type: JobType,
    pub status: JobState,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub payload: serde_json::Value,
    pub progress: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}
