//! AgentOrchestrator (§4.4): health scoring, git reconciliation,
//! cleanup, integrity validation and workload-based rebalancing.
//!
//! These are pure functions over an in-memory [`Project`] snapshot (plus
//! whatever git/task-count facts the caller already gathered), mirroring
//! the teacher's preference for logic-heavy, IO-free functions that the
//! thin protocol facade composes with the actual stores. Grounded on the
//! teacher's `RepositoryStats`-driven reporting style
//! (`core/src/repository.rs`) generalized from task-level to
//! project-level aggregation.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::project::{default_call_agent, Agent, Project, Tree, MAIN_TREE};
use crate::task_store::TaskStoreStats;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: u8,
    /// Git branches without a corresponding task tree yet.
    pub obsolete_branches: Vec<String>,
    /// Task trees without a corresponding git branch.
    pub trees_without_branch: Vec<String>,
    pub data_inconsistencies: Vec<String>,
    pub agent_misalignments: Vec<String>,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub blocked_tasks: u64,
    pub overdue_tasks: u64,
}

/// `health_check`: deductions are flat per nonempty category (§4.4),
/// floored at 0.
pub fn health_check(
    project: &Project,
    git_branches: &[String],
    dashboard_task_counts: &HashMap<String, u64>,
    actual_task_counts: &HashMap<String, u64>,
    stats_by_tree: &HashMap<String, TaskStoreStats>,
) -> HealthReport {
    let branch_set: BTreeSet<&str> = git_branches.iter().map(String::as_str).collect();
    let tree_set: BTreeSet<&str> = project.task_trees.keys().map(String::as_str).collect();

    let obsolete_branches: Vec<String> = branch_set
        .difference(&tree_set)
        .map(|s| s.to_string())
        .collect();
    let trees_without_branch: Vec<String> = tree_set
        .difference(&branch_set)
        .map(|s| s.to_string())
        .collect();

    let mut data_inconsistencies = Vec::new();
    for (tree_id, dashboard_count) in dashboard_task_counts {
        let actual = actual_task_counts.get(tree_id).copied().unwrap_or(0);
        if *dashboard_count != actual {
            data_inconsistencies.push(format!(
                "tree '{tree_id}': dashboard reports {dashboard_count} tasks, actual is {actual}"
            ));
        }
    }

    let mut agent_misalignments = Vec::new();
    for (agent_id, trees) in &project.agent_assignments {
        if !project.registered_agents.contains_key(agent_id) {
            agent_misalignments.push(format!("assignment references unregistered agent '{agent_id}'"));
            continue;
        }
        for tree_id in trees {
            if !project.task_trees.contains_key(tree_id) {
                agent_misalignments.push(format!(
                    "agent '{agent_id}' assigned to unknown tree '{tree_id}'"
                ));
            }
        }
    }

    let mut total_tasks = 0u64;
    let mut completed_tasks = 0u64;
    let mut overdue_tasks = 0u64;
    let mut blocked_tasks = 0u64;
    for stats in stats_by_tree.values() {
        total_tasks += stats.total_tasks;
        overdue_tasks += stats.overdue;
        completed_tasks += stats.tasks_by_status.get("done").copied().unwrap_or(0);
        blocked_tasks += stats.tasks_by_status.get("blocked").copied().unwrap_or(0);
    }

    let mut score: i32 = 100;
    if !obsolete_branches.is_empty() || !trees_without_branch.is_empty() {
        score -= 15;
    }
    if !data_inconsistencies.is_empty() {
        score -= 25;
    }
    if !agent_misalignments.is_empty() {
        score -= 10;
    }

    HealthReport {
        score: score.clamp(0, 100) as u8,
        obsolete_branches,
        trees_without_branch,
        data_inconsistencies,
        agent_misalignments,
        total_tasks,
        completed_tasks,
        blocked_tasks,
        overdue_tasks,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitSyncReport {
    pub created_trees: Vec<String>,
    pub removed_trees: Vec<String>,
}

/// `sync_with_git`: branches (plus "main") become the authoritative set
/// of task trees.
pub fn sync_with_git(project: &mut Project, git_branches: &[String]) -> GitSyncReport {
    let mut branches: BTreeSet<String> = git_branches.iter().cloned().collect();
    branches.insert(MAIN_TREE.to_string());

    let existing: BTreeSet<String> = project.task_trees.keys().cloned().collect();

    let mut removed_trees = Vec::new();
    for tree_id in existing.difference(&branches) {
        if tree_id == MAIN_TREE {
            continue;
        }
        project.task_trees.remove(tree_id);
        for trees in project.agent_assignments.values_mut() {
            trees.retain(|t| t != tree_id);
        }
        removed_trees.push(tree_id.clone());
    }

    let mut created_trees = Vec::new();
    for branch in branches.difference(&existing) {
        project.task_trees.insert(
            branch.clone(),
            Tree {
                id: branch.clone(),
                name: branch.clone(),
                description: String::new(),
            },
        );
        created_trees.push(branch.clone());
    }

    if !created_trees.is_empty() || !removed_trees.is_empty() {
        project.touch();
    }

    GitSyncReport {
        created_trees,
        removed_trees,
    }
}

/// Top-level project fields allowed to survive a `cleanup_obsolete`
/// pass; anything else on the raw JSON document is considered drift
/// from manual editing and is stripped by the caller before re-parsing.
pub const WHITELISTED_PROJECT_FIELDS: &[&str] = &[
    "id",
    "name",
    "description",
    "task_trees",
    "registered_agents",
    "agent_assignments",
    "created_at",
    "updated_at",
    "last_git_sync",
    "current_branch",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed_trees: Vec<String>,
    pub pruned_assignments: Vec<String>,
    pub restored_main: bool,
}

/// `cleanup_obsolete`: remove trees not backed by a git branch, prune
/// stale/unregistered assignments, and restore "main" if it went
/// missing.
pub fn cleanup_obsolete(project: &mut Project, git_branches: &[String]) -> CleanupReport {
    let branches: BTreeSet<&str> = git_branches.iter().map(String::as_str).chain([MAIN_TREE]).collect();

    let stale_trees: Vec<String> = project
        .task_trees
        .keys()
        .filter(|t| t.as_str() != MAIN_TREE && !branches.contains(t.as_str()))
        .cloned()
        .collect();
    for tree_id in &stale_trees {
        project.task_trees.remove(tree_id);
    }

    let pruned_assignments = project.prune_invalid_assignments();

    let restored_main = if !project.task_trees.contains_key(MAIN_TREE) {
        project.task_trees.insert(MAIN_TREE.to_string(), Tree::main());
        true
    } else {
        false
    };

    project.touch();
    CleanupReport {
        removed_trees: stale_trees,
        pruned_assignments,
        restored_main,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub count_mismatches: Vec<String>,
    pub pruned_assignments: Vec<String>,
    pub defaults_filled: Vec<String>,
}

/// `validate_integrity`: reconcile per-tree task counts against the
/// dashboard, prune dangling assignments, and backfill missing
/// required fields on trees/agents.
pub fn validate_integrity(
    project: &mut Project,
    dashboard_task_counts: &HashMap<String, u64>,
    actual_task_counts: &HashMap<String, u64>,
) -> IntegrityReport {
    let mut count_mismatches = Vec::new();
    for tree_id in project.task_trees.keys() {
        let dashboard = dashboard_task_counts.get(tree_id).copied().unwrap_or(0);
        let actual = actual_task_counts.get(tree_id).copied().unwrap_or(0);
        if dashboard != actual {
            count_mismatches.push(format!(
                "tree '{tree_id}': dashboard={dashboard} actual={actual}"
            ));
        }
    }

    let pruned_assignments = project.prune_invalid_assignments();

    let mut defaults_filled = Vec::new();
    for (tree_id, tree) in project.task_trees.iter_mut() {
        if tree.name.trim().is_empty() {
            tree.name = tree_id.clone();
            defaults_filled.push(format!("tree '{tree_id}': filled missing name"));
        }
    }
    for (agent_id, agent) in project.registered_agents.iter_mut() {
        if agent.call_agent.trim().is_empty() {
            agent.call_agent = default_call_agent(agent_id);
            defaults_filled.push(format!("agent '{agent_id}': filled missing call_agent"));
        }
        if agent.name.trim().is_empty() {
            agent.name = agent_id.clone();
            defaults_filled.push(format!("agent '{agent_id}': filled missing name"));
        }
    }

    project.touch();
    IntegrityReport {
        count_mismatches,
        pruned_assignments,
        defaults_filled,
    }
}

/// Per-tree workload input for `rebalance_agents`, computed by the
/// caller from that tree's actual tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeWorkload {
    pub todo_count: u64,
    pub high_priority_todo_count: u64,
    pub required_task_types: Vec<String>,
}

impl TreeWorkload {
    /// `3·(high-priority todo count) + (todo count)` (§4.4).
    pub fn score(&self) -> f64 {
        3.0 * self.high_priority_todo_count as f64 + self.todo_count as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    /// tree_id -> agent_id assigned by this pass.
    pub assignments: HashMap<String, String>,
}

/// `rebalance_agents`: for every tree with positive workload score,
/// assign the agent maximizing `expertise_score − 0.5·current_load`,
/// falling back to the least-loaded agent so every active tree with
/// work keeps at least one assignee.
pub fn rebalance_agents(
    project: &mut Project,
    workloads: &HashMap<String, TreeWorkload>,
) -> RebalanceReport {
    let current_load: HashMap<String, usize> = project
        .agent_assignments
        .iter()
        .map(|(agent_id, trees)| (agent_id.clone(), trees.len()))
        .collect();

    let mut assignments = HashMap::new();
    if project.registered_agents.is_empty() {
        return RebalanceReport { assignments };
    }

    let mut trees_by_score: Vec<(&String, &TreeWorkload)> = workloads
        .iter()
        .filter(|(_, w)| w.score() > 0.0)
        .collect();
    trees_by_score.sort_by(|a, b| {
        b.1.score()
            .partial_cmp(&a.1.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut load = current_load;
    for (tree_id, workload) in trees_by_score {
        let best_agent = best_agent_for(project, &load, &workload.required_task_types);
        if let Some(agent_id) = best_agent {
            let trees = project.agent_assignments.entry(agent_id.clone()).or_default();
            if !trees.iter().any(|t| t == tree_id) {
                trees.push(tree_id.clone());
            }
            *load.entry(agent_id.clone()).or_insert(0) += 1;
            assignments.insert(tree_id.clone(), agent_id);
        }
    }

    project.touch();
    RebalanceReport { assignments }
}

fn best_agent_for(
    project: &Project,
    load: &HashMap<String, usize>,
    task_types: &[String],
) -> Option<String> {
    project
        .registered_agents
        .values()
        .max_by(|a: &&Agent, b: &&Agent| {
            score_for(a, load, task_types)
                .partial_cmp(&score_for(b, load, task_types))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|agent| agent.id.clone())
}

fn score_for(agent: &Agent, load: &HashMap<String, usize>, task_types: &[String]) -> f64 {
    let current_load = load.get(&agent.id).copied().unwrap_or(0) as f64;
    agent.expertise_score(task_types) - 0.5 * current_load
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_feature_tree() -> Project {
        let mut project = Project::new("web_app", "Web App");
        project.task_trees.insert(
            "feature_x".to_string(),
            Tree {
                id: "feature_x".to_string(),
                name: "Feature X".to_string(),
                description: String::new(),
            },
        );
        project
    }

    #[test]
    fn health_check_deducts_for_obsolete_and_missing_trees() {
        let project = project_with_feature_tree();
        let report = health_check(
            &project,
            &["main".to_string(), "feature_y".to_string()],
            &HashMap::new(),
            &HashMap::new(),
            &HashMap::new(),
        );
        assert!(report.obsolete_branches.contains(&"feature_y".to_string()));
        assert!(report.trees_without_branch.contains(&"feature_x".to_string()));
        assert_eq!(report.score, 85);
    }

    #[test]
    fn health_check_full_score_when_consistent() {
        let project = Project::new("web_app", "Web App");
        let report = health_check(
            &project,
            &["main".to_string()],
            &HashMap::new(),
            &HashMap::new(),
            &HashMap::new(),
        );
        assert_eq!(report.score, 100);
    }

    #[test]
    fn sync_with_git_removes_and_creates_trees() {
        let mut project = project_with_feature_tree();
        let report = sync_with_git(&mut project, &["main".to_string(), "feature_y".to_string()]);
        assert_eq!(report.removed_trees, vec!["feature_x".to_string()]);
        assert_eq!(report.created_trees, vec!["feature_y".to_string()]);
        assert!(project.task_trees.contains_key("feature_y"));
        assert!(!project.task_trees.contains_key("feature_x"));
        assert!(project.task_trees.contains_key(MAIN_TREE));
    }

    #[test]
    fn cleanup_obsolete_restores_main_and_prunes() {
        let mut project = project_with_feature_tree();
        project.task_trees.remove(MAIN_TREE);
        project
            .agent_assignments
            .insert("ghost".to_string(), vec!["feature_x".to_string()]);
        let report = cleanup_obsolete(&mut project, &[]);
        assert!(report.restored_main);
        assert!(report.removed_trees.contains(&"feature_x".to_string()));
        assert!(project.task_trees.contains_key(MAIN_TREE));
        assert!(!project.agent_assignments.contains_key("ghost"));
    }

    #[test]
    fn validate_integrity_fills_missing_defaults() {
        let mut project = Project::new("web_app", "Web App");
        project.registered_agents.insert(
            "coding_agent".to_string(),
            Agent {
                id: "coding_agent".to_string(),
                name: String::new(),
                call_agent: String::new(),
                capabilities: vec![],
                expertise: Default::default(),
                preferred_task_types: vec![],
                registered_at: None,
            },
        );
        let report = validate_integrity(&mut project, &HashMap::new(), &HashMap::new());
        assert!(!report.defaults_filled.is_empty());
        let agent = &project.registered_agents["coding_agent"];
        assert_eq!(agent.call_agent, "@coding-agent-agent");
    }

    #[test]
    fn rebalance_assigns_highest_scoring_agent_to_busiest_tree() {
        let mut project = project_with_feature_tree();
        let mut rust_dev = Agent::new("rust_dev", "Rust Dev");
        rust_dev.expertise.insert("backend".to_string(), 0.9);
        project.registered_agents.insert("rust_dev".to_string(), rust_dev);
        project
            .registered_agents
            .insert("generalist".to_string(), Agent::new("generalist", "Generalist"));

        let mut workloads = HashMap::new();
        workloads.insert(
            "feature_x".to_string(),
            TreeWorkload {
                todo_count: 4,
                high_priority_todo_count: 2,
                required_task_types: vec!["backend".to_string()],
            },
        );

        let report = rebalance_agents(&mut project, &workloads);
        assert_eq!(report.assignments.get("feature_x"), Some(&"rust_dev".to_string()));
    }

    #[test]
    fn rebalance_skips_trees_with_zero_score() {
        let mut project = project_with_feature_tree();
        project
            .registered_agents
            .insert("generalist".to_string(), Agent::new("generalist", "Generalist"));
        let mut workloads = HashMap::new();
        workloads.insert("feature_x".to_string(), TreeWorkload::default());
        let report = rebalance_agents(&mut project, &workloads);
        assert!(report.assignments.is_empty());
    }
}
