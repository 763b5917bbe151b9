//! AutoRuleGenerator (§4.5): compose a task, an agent role and (in the
//! full path) a project scan into the `auto_rule.mdc` artifact that
//! downstream AI assistants read as their prompt.
//!
//! Grounded on the original `rules_generator.py`'s two-tier generation
//! (a compact template vs. a role-pack-driven structured document) and
//! on the teacher's write-with-fallback discipline for artifacts it
//! can't guarantee a writable destination for.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::task::Task;
use crate::project_analyzer::{phase_for_status, Phase, ProjectAnalysis, ProjectAnalyzer};

/// A loaded `agent-library/<agent>/job_desc.yaml` pack plus its
/// sibling `contexts/`, `rules/`, `tools/`, `output_format/` content,
/// flattened to strings for composition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RolePack {
    pub name: String,
    pub job_desc: String,
    pub contexts: Vec<String>,
    pub rules: Vec<String>,
    pub tools: Vec<String>,
    pub output_format: String,
}

/// Loads a named role pack from the agent-library. Left as a trait so
/// the protocol/server layers can swap in a real filesystem-backed
/// loader without `core` depending on a particular on-disk convention
/// beyond the directory name.
#[async_trait]
pub trait AgentRoleProvider: Send + Sync {
    async fn load_role(&self, agent_library_dir: &Path, role_name: &str) -> Result<RolePack>;
}

/// Reads `job_desc.yaml` plus the `contexts/`, `rules/`, `tools/`,
/// `output_format/` subdirectories as UTF-8 text, one pack entry per
/// file (sorted by filename for determinism). Not concerned with
/// packaging/versioning the library itself (§ non-goal).
pub struct FsAgentRoleProvider;

#[async_trait]
impl AgentRoleProvider for FsAgentRoleProvider {
    async fn load_role(&self, agent_library_dir: &Path, role_name: &str) -> Result<RolePack> {
        let role_dir = agent_library_dir.join(role_name);
        let job_desc = tokio::fs::read_to_string(role_dir.join("job_desc.yaml"))
            .await
            .unwrap_or_default();
        Ok(RolePack {
            name: role_name.to_string(),
            job_desc,
            contexts: read_dir_sorted(&role_dir.join("contexts")).await,
            rules: read_dir_sorted(&role_dir.join("rules")).await,
            tools: read_dir_sorted(&role_dir.join("tools")).await,
            output_format: read_dir_sorted(&role_dir.join("output_format"))
                .await
                .join("\n\n"),
        })
    }
}

async fn read_dir_sorted(dir: &Path) -> Vec<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(_) => return Vec::new(),
    };
    let mut paths = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        paths.push(entry.path());
    }
    paths.sort();

    let mut contents = Vec::with_capacity(paths.len());
    for path in paths {
        if let Ok(text) = tokio::fs::read_to_string(&path).await {
            contents.push(text);
        }
    }
    contents
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    Written(PathBuf),
    FellBackToTemp { intended: PathBuf, actual: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRule {
    pub content: String,
    pub outcome: WriteOutcome,
}

pub struct AutoRuleGenerator;

impl AutoRuleGenerator {
    /// Simple path: a compact template, used unless `force_full_generation`.
    pub fn generate_simple(task: &Task) -> String {
        let assignee = task.assignees.first().cloned().unwrap_or_else(|| "unassigned".to_string());
        format!(
            "# Auto Rule: {id}\n\n\
             **Role:** {assignee}\n\n\
             ## {title}\n\n\
             {description}\n\n\
             - **Priority:** {priority:?}\n\
             - **Labels:** {labels}\n",
            id = task.id,
            assignee = assignee,
            title = task.title,
            description = task.description,
            priority = task.priority,
            labels = task
                .labels
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Full path: role pack + project analysis, composed into a
    /// structured document.
    pub fn generate_full(task: &Task, role: &RolePack, analysis: &ProjectAnalysis) -> String {
        let phase = phase_for_status(task.status);
        let mut out = String::new();
        out.push_str(&format!("# {} — {} Phase\n\n", role.name, phase.title()));
        out.push_str(&format!("**Task:** {} ({})\n\n", task.title, task.id));
        out.push_str(&format!("**Phase:** {}\n\n", phase.title()));

        if !role.job_desc.is_empty() {
            out.push_str("## Role\n\n");
            out.push_str(&role.job_desc);
            out.push_str("\n\n");
        }
        if !role.contexts.is_empty() {
            out.push_str("## Contexts\n\n");
            for ctx in &role.contexts {
                out.push_str(ctx);
                out.push_str("\n\n");
            }
        }
        if !role.rules.is_empty() {
            out.push_str("## Rules\n\n");
            for rule in &role.rules {
                out.push_str(rule);
                out.push_str("\n\n");
            }
        }
        if !role.tools.is_empty() {
            out.push_str("## Tools & Output Guidance\n\n");
            for tool in &role.tools {
                out.push_str(tool);
                out.push_str("\n\n");
            }
        }

        out.push_str("## Phase-Specific Context\n\n");
        if !analysis.patterns.is_empty() {
            out.push_str(&format!("**Detected patterns:** {}\n\n", analysis.patterns.join(", ")));
        }
        if !analysis.frameworks.is_empty() {
            out.push_str(&format!("**Frameworks:** {}\n\n", analysis.frameworks.join(", ")));
        }
        if !analysis.dependencies.is_empty() {
            out.push_str(&format!("**Dependencies:** {}\n\n", analysis.dependencies.join(", ")));
        }
        for line in &analysis.phase_guidance {
            out.push_str(&format!("- {line}\n"));
        }

        if !role.output_format.is_empty() {
            out.push_str("\n## Output Format\n\n");
            out.push_str(&role.output_format);
            out.push('\n');
        }

        out
    }

    /// Runs the full path end-to-end: locates the agent-library
    /// directory, loads the role pack, scans the project for the
    /// task's phase, and composes the artifact. Callers that already
    /// have a [`ProjectAnalysis`] (e.g. cached) should call
    /// [`Self::generate_full`] directly instead.
    pub async fn generate_full_for_project(
        project_root: &Path,
        task: &Task,
        role_name: &str,
        role_provider: &dyn AgentRoleProvider,
    ) -> Result<String> {
        let agent_library_dir = crate::project_analyzer::agent_library_dir(project_root);
        let role = role_provider.load_role(&agent_library_dir, role_name).await?;
        let phase = phase_for_status(task.status);
        let analysis = ProjectAnalyzer::analyze(project_root, phase)?;
        Ok(Self::generate_full(task, &role, &analysis))
    }

    /// Writes `content` to `<project_root>/.cursor/rules/auto_rule.mdc`,
    /// downgrading to a temp-directory path on write failure (read-only
    /// destination) rather than failing the task operation.
    pub async fn write_artifact(project_root: &Path, content: &str) -> GeneratedRule {
        let intended = project_root.join(".cursor/rules/auto_rule.mdc");
        match write_with_parents(&intended, content).await {
            Ok(()) => GeneratedRule {
                content: content.to_string(),
                outcome: WriteOutcome::Written(intended),
            },
            Err(_) => {
                let fallback = std::env::temp_dir().join(format!(
                    "auto_rule_{}.mdc",
                    uuid_like_suffix()
                ));
                // Best-effort: if even the temp directory write fails
                // there is nothing more reasonable to fall back to; the
                // caller still gets the generated content back.
                let _ = write_with_parents(&fallback, content).await;
                GeneratedRule {
                    content: content.to_string(),
                    outcome: WriteOutcome::FellBackToTemp {
                        intended,
                        actual: fallback,
                    },
                }
            }
        }
    }
}

async fn write_with_parents(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Small dependency-free unique suffix (process id + elapsed ticks);
/// not cryptographically meaningful, just enough to avoid collisions
/// between concurrent fallback writes.
fn uuid_like_suffix() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TaskId;
    use crate::models::task::{Priority, TaskStatus};
    use chrono::Utc;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::from_string("T1").unwrap(),
            title: "Add login form".into(),
            description: "Build the login form per the design spec".into(),
            status: TaskStatus::InProgress,
            priority: Priority::High,
            details: String::new(),
            estimated_effort: None,
            assignees: vec!["@coding-agent".into()],
            labels: Default::default(),
            due_date: None,
            dependencies: vec![],
            subtasks: vec![],
            created_at: now,
            updated_at: now,
            context_id: None,
            project_id: "web_app".into(),
        }
    }

    #[test]
    fn simple_generation_includes_core_fields() {
        let rule = AutoRuleGenerator::generate_simple(&sample_task());
        assert!(rule.contains("Add login form"));
        assert!(rule.contains("@coding-agent"));
        assert!(rule.contains("High"));
    }

    #[test]
    fn full_generation_includes_role_and_phase_sections() {
        let task = sample_task();
        let role = RolePack {
            name: "coding_agent".into(),
            job_desc: "You write production Rust.".into(),
            contexts: vec!["Context A".into()],
            rules: vec!["Never skip tests.".into()],
            tools: vec!["Use cargo fmt.".into()],
            output_format: "Return a diff.".into(),
        };
        let analysis = ProjectAnalysis {
            patterns: vec!["Rust project".into()],
            frameworks: vec![],
            dependencies: vec!["serde".into()],
            structure: vec![],
            phase_guidance: vec!["Follow existing conventions.".into()],
        };
        let rule = AutoRuleGenerator::generate_full(&task, &role, &analysis);
        assert!(rule.contains("Coding Phase"));
        assert!(rule.contains("Never skip tests."));
        assert!(rule.contains("Rust project"));
        assert!(rule.contains("Return a diff."));
    }

    #[tokio::test]
    async fn write_artifact_writes_to_project_root_when_writable() {
        let dir = tempfile::tempdir().unwrap();
        let result = AutoRuleGenerator::write_artifact(dir.path(), "hello").await;
        match result.outcome {
            WriteOutcome::Written(path) => {
                assert!(path.ends_with(".cursor/rules/auto_rule.mdc"));
                let contents = tokio::fs::read_to_string(&path).await.unwrap();
                assert_eq!(contents, "hello");
            }
            WriteOutcome::FellBackToTemp { .. } => panic!("expected a direct write"),
        }
    }
}
