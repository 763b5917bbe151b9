//! Project, task-tree and agent domain models (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the tree that is always present and protected from deletion
/// without `force`.
pub const MAIN_TREE: &str = "main";

/// A named bucket of tasks within a project, analogous to a git branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Tree {
    pub fn main() -> Self {
        Self {
            id: MAIN_TREE.to_string(),
            name: "Main".to_string(),
            description: "Default task tree".to_string(),
        }
    }
}

/// A declarative agent role definition plus the id used in assignments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Call-agent handle, defaults to `@<id-with-dashes>-agent`.
    pub call_agent: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub expertise: BTreeMap<String, f64>,
    #[serde(default)]
    pub preferred_task_types: Vec<String>,
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let call_agent = default_call_agent(&id);
        Self {
            id,
            name: name.into(),
            call_agent,
            capabilities: Vec::new(),
            expertise: BTreeMap::new(),
            preferred_task_types: Vec::new(),
            registered_at: Some(Utc::now()),
        }
    }

    /// Expertise score against a task's required labels/types, used by
    /// `rebalance_agents`.
    pub fn expertise_score(&self, task_types: &[String]) -> f64 {
        if task_types.is_empty() {
            return 0.0;
        }
        let matched: f64 = task_types
            .iter()
            .map(|t| *self.expertise.get(t).unwrap_or(&0.0))
            .sum();
        matched / task_types.len() as f64
    }
}

/// Sparse update for an existing agent: only `Some` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub call_agent: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub expertise: Option<BTreeMap<String, f64>>,
    pub preferred_task_types: Option<Vec<String>>,
}

/// `@<id-with-dashes>-agent` default call handle.
pub fn default_call_agent(id: &str) -> String {
    format!("@{}-agent", id.replace('_', "-"))
}

/// A project: a hierarchy of task trees, registered agents, and their
/// tree assignments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub task_trees: BTreeMap<String, Tree>,
    pub registered_agents: BTreeMap<String, Agent>,
    /// agent_id -> tree ids it is assigned to.
    pub agent_assignments: BTreeMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_git_sync: Option<DateTime<Utc>>,
    pub current_branch: Option<String>,
}

impl Project {
    /// New project always satisfies invariant P1 ("main" tree present).
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut task_trees = BTreeMap::new();
        task_trees.insert(MAIN_TREE.to_string(), Tree::main());
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            task_trees,
            registered_agents: BTreeMap::new(),
            agent_assignments: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            last_git_sync: None,
            current_branch: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Invariant P3: agent_assignments never references an unregistered
    /// agent, and (P2) only trees that exist in the same project.
    pub fn assignments_are_consistent(&self) -> bool {
        self.agent_assignments.iter().all(|(agent_id, trees)| {
            self.registered_agents.contains_key(agent_id)
                && trees.iter().all(|t| self.task_trees.contains_key(t))
        })
    }

    pub fn prune_invalid_assignments(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        let known_trees: std::collections::BTreeSet<_> =
            self.task_trees.keys().cloned().collect();
        let known_agents: std::collections::BTreeSet<_> =
            self.registered_agents.keys().cloned().collect();

        self.agent_assignments.retain(|agent_id, _trees| {
            if !known_agents.contains(agent_id) {
                removed.push(format!("removed assignments for unregistered agent {agent_id}"));
                return false;
            }
            true
        });

        for (agent_id, trees) in self.agent_assignments.iter_mut() {
            let before = trees.len();
            trees.retain(|t| known_trees.contains(t));
            if trees.len() != before {
                removed.push(format!("pruned stale tree assignment(s) for agent {agent_id}"));
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_has_main_tree() {
        let project = Project::new("web_app", "Web App");
        assert!(project.task_trees.contains_key(MAIN_TREE));
    }

    #[test]
    fn default_call_agent_format() {
        assert_eq!(default_call_agent("coding_agent"), "@coding-agent-agent");
    }

    #[test]
    fn prune_invalid_assignments_removes_unregistered_agent() {
        let mut project = Project::new("web_app", "Web App");
        project
            .agent_assignments
            .insert("ghost".to_string(), vec![MAIN_TREE.to_string()]);
        let removed = project.prune_invalid_assignments();
        assert!(!removed.is_empty());
        assert!(!project.agent_assignments.contains_key("ghost"));
    }

    #[test]
    fn expertise_score_averages_matched_labels() {
        let mut agent = Agent::new("rust-dev", "Rust Dev");
        agent.expertise.insert("rust".to_string(), 0.9);
        agent.expertise.insert("backend".to_string(), 0.6);
        let score = agent.expertise_score(&["rust".to_string(), "backend".to_string()]);
        assert!((score - 0.75).abs() < 1e-9);
    }
}
