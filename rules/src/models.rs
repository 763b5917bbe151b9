//! Rule domain models (§4.6–4.10): parsed rule files, inheritance and
//! composition results, cache entries, and client-sync types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Rule file format, detected from extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleFormat {
    Mdc,
    Md,
    Json,
    Yaml,
    Txt,
}

impl RuleFormat {
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase().as_str() {
            "mdc" => Self::Mdc,
            "md" => Self::Md,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Txt,
        }
    }
}

/// Rule type, classified from pathname first then keyword fallback (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Core,
    Workflow,
    Project,
    Agent,
    Context,
    Custom,
}

impl RuleType {
    /// Deterministic priority order for type-based sorting (§4.8):
    /// core > workflow > project > agent > context > custom. Declaration
    /// order on the enum matches this, so `Ord` gives it directly.
    pub fn priority_rank(self) -> u8 {
        self as u8
    }
}

/// A parsed rule file: raw content plus everything `RuleParser`
/// extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleFile {
    pub path: PathBuf,
    pub format: RuleFormat,
    pub rule_type: RuleType,
    pub raw_content: String,
    /// Header-normalized-name -> section body.
    pub sections: BTreeMap<String, String>,
    pub references: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
    pub warnings: Vec<String>,
}

impl RuleFile {
    pub fn empty(path: PathBuf, format: RuleFormat, warning: impl Into<String>) -> Self {
        Self {
            path,
            format,
            rule_type: RuleType::Custom,
            raw_content: String::new(),
            sections: BTreeMap::new(),
            references: Vec::new(),
            variables: BTreeMap::new(),
            dependencies: Vec::new(),
            warnings: vec![warning.into()],
        }
    }

    pub fn size(&self) -> usize {
        self.raw_content.len()
    }
}

/// Inheritance relationship type (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InheritanceType {
    Full,
    Content,
    Selective,
    Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InheritanceEdge {
    pub child: PathBuf,
    pub parent: PathBuf,
    pub inheritance_type: InheritanceType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConflictRecord {
    pub path_a: PathBuf,
    pub path_b: PathBuf,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InheritanceAnalysis {
    pub inheritance_map: Vec<InheritanceEdge>,
    pub dependency_graph: BTreeMap<String, Vec<String>>,
    pub conflicts: Vec<RuleConflictRecord>,
}

/// How a conflicting element was resolved during composition (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConflictStrategy {
    Merge,
    Override,
    Append,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionStrategy {
    Sequential,
    PriorityMerge,
    Intelligent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedConflict {
    pub section: String,
    pub strategy: ConflictStrategy,
    pub winning_source: String,
    pub discarded_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Composition {
    pub output_format: RuleFormat,
    pub content: String,
    pub resolved_conflicts: Vec<ResolvedConflict>,
    pub sources: Vec<PathBuf>,
}

/// Cache entry priority, used for eviction ordering (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CachePriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Auth method for a registered sync client (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    ApiKey,
    Token,
    OAuth2,
    Certificate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Push,
    Pull,
    Bidirectional,
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub id: String,
    pub name: String,
    pub auth_method: AuthMethod,
    pub secret: String,
    pub sync_permissions: Vec<SyncOperation>,
    pub rate_limit_per_minute: u32,
    pub sync_frequency_seconds: u64,
    pub allowed_rule_types: Vec<RuleType>,
    pub auto_sync: bool,
    pub default_conflict_resolution: ConflictStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConflict {
    pub path: PathBuf,
    pub client_version: String,
    pub server_version: String,
    pub auto_resolvable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    pub processed_rules: Vec<PathBuf>,
    pub conflicts: Vec<RuleConflict>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub changes_applied: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientStatus {
    pub id: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_requests: u32,
    pub rate_limited: bool,
}
