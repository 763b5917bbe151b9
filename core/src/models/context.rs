//! The per-task `ContextRecord` structured context document (§3, §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextMetadata {
    pub task_id: String,
    pub project_id: String,
    pub tree_id: String,
    pub user_id: String,
    pub status: String,
    pub priority: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextObjective {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub effort: Option<String>,
    pub due: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextRequirements {
    #[serde(default)]
    pub checklist: Vec<String>,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
    #[serde(default)]
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextTechnical {
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextDependencies {
    #[serde(default)]
    pub task_dependencies: Vec<String>,
    #[serde(default)]
    pub external_dependencies: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressAction {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub status: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextProgress {
    #[serde(default)]
    pub completed_actions: Vec<ProgressAction>,
    #[serde(default)]
    pub current_session_summary: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub completion_percentage: f64,
    #[serde(default)]
    pub time_spent_minutes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextSubtaskSummary {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub completed: usize,
    #[serde(default)]
    pub percentage: f64,
}

/// The category an insight belongs to. Default is `Insight`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    #[default]
    Insight,
    Challenge,
    Solution,
    Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    pub content: String,
    pub agent: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextNotes {
    #[serde(default)]
    pub insights: Vec<Insight>,
}

/// An arbitrary, named custom section attached to a context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomSection {
    pub name: String,
    pub content: serde_json::Value,
}

/// The full structured context document for one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextRecord {
    pub metadata: ContextMetadata,
    #[serde(default)]
    pub objective: ContextObjective,
    #[serde(default)]
    pub requirements: ContextRequirements,
    #[serde(default)]
    pub technical: ContextTechnical,
    #[serde(default)]
    pub dependencies: ContextDependencies,
    #[serde(default)]
    pub progress: ContextProgress,
    #[serde(default)]
    pub subtasks: ContextSubtaskSummary,
    #[serde(default)]
    pub notes: ContextNotes,
    #[serde(default)]
    pub custom_sections: Vec<CustomSection>,
}

/// Per-tree index entry summarizing one context for listing, per §4.2.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextIndexEntry {
    pub task_id: String,
    pub title: String,
    pub status: String,
    pub assignees: Vec<String>,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_is_empty_but_valid() {
        let ctx = ContextRecord::default();
        assert_eq!(ctx.metadata.version, 0); // struct default, not constructor default
        assert!(ctx.notes.insights.is_empty());
    }

    #[test]
    fn insight_default_kind_is_insight() {
        assert_eq!(InsightKind::default(), InsightKind::Insight);
    }
}
