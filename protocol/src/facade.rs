//! `ToolFacade` (§6): the action-dispatch surface every `manage_*`
//! and `call_agent` tool call goes through. Each method takes the
//! bare `action` name plus a `serde_json::Value` parameter bag and
//! returns an [`ActionResult`] — the wire transport that would carry
//! these over MCP is explicitly out of scope here, so this is the
//! transport-agnostic core of it, in the spirit of the teacher's
//! `McpTaskHandler` (one method per action, thin translation to the
//! underlying stores).

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use orchestrator_core::agent_orchestrator::{
    self, CleanupReport, GitSyncReport, HealthReport, IntegrityReport, RebalanceReport, TreeWorkload,
};
use orchestrator_core::auto_rule_generator::{AgentRoleProvider, AutoRuleGenerator, FsAgentRoleProvider};
use orchestrator_core::context_store::{ContextStore, JsonContextStore};
use orchestrator_core::error::{OrchestratorError, Result as CoreResult};
use orchestrator_core::git::{GitProvider, SystemGitProvider};
use orchestrator_core::ids::TaskId;
use orchestrator_core::models::context::InsightKind;
use orchestrator_core::models::project::{Agent, AgentUpdate};
use orchestrator_core::models::task::{EstimatedEffort, NewTask, Priority, Task, TaskFilter, TaskStatus};
use orchestrator_core::project_registry::{JsonProjectRegistry, ProjectRegistry};
use orchestrator_core::scope::{ScopeKey, ScopeLocks};
use orchestrator_core::task_store::{JsonTaskStore, TaskStore};
use orchestrator_core::validation::TaskValidator;

use orchestrator_rules::cache::{CacheTier, CacheTierConfig};
use orchestrator_rules::client_sync::ClientSync;
use orchestrator_rules::composer::RuleComposer;
use orchestrator_rules::inheritance::InheritanceResolver;
use orchestrator_rules::models::{ClientConfig, CompositionStrategy, ConflictStrategy, RuleConflict, SyncOperation};
use orchestrator_rules::parser::RuleParser;
use orchestrator_rules::store::RuleStore;

use crate::error::{from_result, ActionResult};

const DEFAULT_USER: &str = "default_id";
const DEFAULT_TREE: &str = "main";

/// Everything the facade needs to build per-scope stores on demand.
/// Construction is cheap; the expensive state (locks, cache, sync
/// client registry) lives behind `Arc`/interior mutability so cloning
/// a `ToolFacade` is safe to share across concurrent tool calls.
#[derive(Clone)]
pub struct ToolFacade {
    /// Root directory for tasks/contexts/projects.json JSON storage.
    data_root: PathBuf,
    /// Repository root: where `.cursor/rules`, `agent-library` and the
    /// git working tree live.
    project_root: PathBuf,
    registry: Arc<JsonProjectRegistry>,
    scope_locks: Arc<ScopeLocks>,
    git: Arc<dyn GitProvider>,
    role_provider: Arc<dyn AgentRoleProvider>,
    cache: Arc<CacheTier>,
    client_sync: Arc<ClientSync>,
}

impl ToolFacade {
    pub fn new(data_root: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        let scope_locks = Arc::new(ScopeLocks::new());
        let data_root = data_root.into();
        Self {
            registry: Arc::new(JsonProjectRegistry::new(&data_root, scope_locks.registry_lock())),
            data_root,
            project_root: project_root.into(),
            scope_locks,
            git: Arc::new(SystemGitProvider),
            role_provider: Arc::new(FsAgentRoleProvider),
            cache: Arc::new(CacheTier::new(CacheTierConfig::default())),
            client_sync: Arc::new(ClientSync::new()),
        }
    }

    /// Swap in an alternate git provider (a fake in tests, say).
    /// Everything else about the facade is unchanged.
    pub fn with_git(mut self, git: Arc<dyn GitProvider>) -> Self {
        self.git = git;
        self
    }

    fn rule_store(&self) -> RuleStore {
        RuleStore::new(self.project_root.join(".cursor/rules"))
    }

    async fn task_store(&self, user_id: &str, project_id: &str, tree_id: &str) -> JsonTaskStore {
        let lock = self
            .scope_locks
            .lock_for(ScopeKey::new(user_id, project_id, tree_id))
            .await;
        JsonTaskStore::new(&self.data_root, user_id, project_id, tree_id, lock)
    }

    async fn context_store(&self, user_id: &str, project_id: &str, tree_id: &str) -> JsonContextStore {
        let lock = self
            .scope_locks
            .lock_for(ScopeKey::new(user_id, project_id, tree_id))
            .await;
        JsonContextStore::new(&self.data_root, user_id, project_id, tree_id, lock)
    }

    // ---- manage_project ----------------------------------------------

    pub async fn manage_project(&self, action: &str, params: Value) -> ActionResult {
        match action {
            "create" => {
                let Some(id) = str_field(&params, "project_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id"));
                };
                let name = str_or(&params, "name", &id);
                from_result(self.registry.create_project(&id, &name).await)
            }
            "get" => {
                let Some(id) = str_field(&params, "project_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id"));
                };
                from_result(self.registry.get_project(&id).await)
            }
            "list" => from_result(self.registry.list_projects().await),
            "update" => {
                let Some(id) = str_field(&params, "project_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id"));
                };
                let name = str_field(&params, "name");
                let description = str_field(&params, "description");
                from_result(self.registry.update_project(&id, name, description).await)
            }
            "create_tree" => {
                let (Some(pid), Some(tid)) = (str_field(&params, "project_id"), str_field(&params, "task_tree_id"))
                else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id/task_tree_id"));
                };
                let name = str_or(&params, "name", &tid);
                from_result(self.registry.create_tree(&pid, &tid, &name).await)
            }
            "delete_tree" => {
                let (Some(pid), Some(tid)) = (str_field(&params, "project_id"), str_field(&params, "task_tree_id"))
                else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id/task_tree_id"));
                };
                let force = bool_or(&params, "force", false);
                let user_id = str_or(&params, "user_id", DEFAULT_USER);
                let store = self.task_store(&user_id, &pid, &tid).await;
                let tasks = match store.find_all(&TaskFilter::default()).await {
                    Ok(t) => t,
                    Err(e) => return ActionResult::err(e),
                };
                if !force && !tasks.is_empty() {
                    return ActionResult::err(OrchestratorError::Validation(format!(
                        "tree '{tid}' holds {} task(s); use force to delete anyway",
                        tasks.len()
                    )));
                }
                if let Err(e) = self.registry.delete_tree(&pid, &tid, force).await {
                    return ActionResult::err(e);
                }
                if let Err(e) = store.delete_scope().await {
                    return ActionResult::err(e);
                }
                if let Err(e) = self.context_store(&user_id, &pid, &tid).await.delete_scope().await {
                    return ActionResult::err(e);
                }
                ActionResult::ok(json!({"deleted": true}))
            }
            "delete_project" => {
                let Some(pid) = str_field(&params, "project_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id"));
                };
                let force = bool_or(&params, "force", false);
                let user_id = str_or(&params, "user_id", DEFAULT_USER);
                let project = match self.registry.get_project(&pid).await {
                    Ok(p) => p,
                    Err(e) => return ActionResult::err(e),
                };
                let tree_ids: Vec<String> = project.task_trees.keys().cloned().collect();
                if !force {
                    for tid in &tree_ids {
                        let store = self.task_store(&user_id, &pid, tid).await;
                        match store.find_all(&TaskFilter::default()).await {
                            Ok(tasks) if !tasks.is_empty() => {
                                return ActionResult::err(OrchestratorError::Validation(format!(
                                    "tree '{tid}' holds {} task(s); use force to delete anyway",
                                    tasks.len()
                                )));
                            }
                            Ok(_) => {}
                            Err(e) => return ActionResult::err(e),
                        }
                    }
                }
                if let Err(e) = self.registry.delete_project(&pid, force).await {
                    return ActionResult::err(e);
                }
                for tid in &tree_ids {
                    if let Err(e) = self.task_store(&user_id, &pid, tid).await.delete_scope().await {
                        return ActionResult::err(e);
                    }
                    if let Err(e) = self.context_store(&user_id, &pid, tid).await.delete_scope().await {
                        return ActionResult::err(e);
                    }
                }
                ActionResult::ok(json!({"deleted": true}))
            }
            "clear_tree" => {
                let (Some(pid), Some(tid)) = (str_field(&params, "project_id"), str_field(&params, "task_tree_id"))
                else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id/task_tree_id"));
                };
                if let Err(e) = self.registry.clear_tree(&pid, &tid).await {
                    return ActionResult::err(e);
                }
                let user_id = str_or(&params, "user_id", DEFAULT_USER);
                let store = self.task_store(&user_id, &pid, &tid).await;
                let tasks = match store.find_all(&TaskFilter::default()).await {
                    Ok(t) => t,
                    Err(e) => return ActionResult::err(e),
                };
                for task in tasks {
                    if let Err(e) = store.delete(&task.id).await {
                        return ActionResult::err(e);
                    }
                }
                ActionResult::ok(json!({"cleared": true}))
            }
            "get_tree_status" => {
                let (Some(pid), Some(tid)) = (str_field(&params, "project_id"), str_field(&params, "task_tree_id"))
                else {
                    return ActionResult::err(OrchestratorError::empty_field("project_id/task_tree_id"));
                };
                from_result(self.registry.get_tree_status(&pid, &tid).await)
            }
            "dashboard" => self.project_dashboard(params).await,
            "orchestrate" => self.project_orchestrate(params).await,
            "project_health_check" => self.project_health_check(params).await,
            "sync_with_git" => self.project_sync_with_git(params).await,
            "cleanup_obsolete" => self.project_cleanup_obsolete(params).await,
            "validate_integrity" => self.project_validate_integrity(params).await,
            "rebalance_agents" => self.project_rebalance_agents(params).await,
            other => ActionResult::bad_action("manage_project", other),
        }
    }

    /// Aggregate view: every tree's [`TreeStatus`] for the project.
    async fn project_dashboard(&self, params: Value) -> ActionResult {
        let Some(pid) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let project = match self.registry.get_project(&pid).await {
            Ok(p) => p,
            Err(e) => return ActionResult::err(e),
        };
        let mut trees = Vec::new();
        for tree_id in project.task_trees.keys() {
            match self.registry.get_tree_status(&pid, tree_id).await {
                Ok(status) => trees.push(status),
                Err(e) => return ActionResult::err(e),
            }
        }
        ActionResult::ok(json!({"project": project, "trees": trees}))
    }

    /// Composite pass: reconcile against git, then rebalance agents.
    async fn project_orchestrate(&self, params: Value) -> ActionResult {
        let sync = self.project_sync_with_git(params.clone()).await;
        if !sync.success {
            return sync;
        }
        let rebalance = self.project_rebalance_agents(params).await;
        ActionResult::ok(json!({"sync_with_git": sync.payload, "rebalance_agents": rebalance.payload}))
    }

    async fn stats_by_tree(
        &self,
        user_id: &str,
        project_id: &str,
        tree_ids: impl Iterator<Item = String>,
    ) -> CoreResult<HashMap<String, orchestrator_core::task_store::TaskStoreStats>> {
        let mut out = HashMap::new();
        for tree_id in tree_ids {
            let store = self.task_store(user_id, project_id, &tree_id).await;
            out.insert(tree_id, store.stats().await?);
        }
        Ok(out)
    }

    async fn project_health_check(&self, params: Value) -> ActionResult {
        let Some(pid) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let user_id = str_or(&params, "user_id", DEFAULT_USER);
        let project = match self.registry.get_project(&pid).await {
            Ok(p) => p,
            Err(e) => return ActionResult::err(e),
        };
        let branches = match self.git.list_branches(&self.project_root).await {
            Ok(b) => b,
            Err(e) => return ActionResult::err(e),
        };
        let stats = match self.stats_by_tree(&user_id, &pid, project.task_trees.keys().cloned()).await {
            Ok(s) => s,
            Err(e) => return ActionResult::err(e),
        };
        let dashboard_counts: HashMap<String, u64> =
            stats.iter().map(|(k, v)| (k.clone(), v.total_tasks)).collect();
        let report: HealthReport =
            agent_orchestrator::health_check(&project, &branches, &dashboard_counts, &dashboard_counts, &stats);
        ActionResult::ok(serde_json::to_value(report).unwrap_or(Value::Null))
    }

    async fn project_sync_with_git(&self, params: Value) -> ActionResult {
        let Some(pid) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let mut project = match self.registry.get_project(&pid).await {
            Ok(p) => p,
            Err(e) => return ActionResult::err(e),
        };
        let branches = match self.git.list_branches(&self.project_root).await {
            Ok(b) => b,
            Err(e) => return ActionResult::err(e),
        };
        let report: GitSyncReport = agent_orchestrator::sync_with_git(&mut project, &branches);
        for tree_id in &report.created_trees {
            if tree_id == "main" {
                continue;
            }
            if let Err(e) = self.registry.create_tree(&pid, tree_id, tree_id).await {
                return ActionResult::err(e);
            }
        }
        for tree_id in &report.removed_trees {
            if let Err(e) = self.registry.delete_tree(&pid, tree_id, true).await {
                return ActionResult::err(e);
            }
        }
        ActionResult::ok(serde_json::to_value(report).unwrap_or(Value::Null))
    }

    async fn project_cleanup_obsolete(&self, params: Value) -> ActionResult {
        let Some(pid) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let mut project = match self.registry.get_project(&pid).await {
            Ok(p) => p,
            Err(e) => return ActionResult::err(e),
        };
        let branches = match self.git.list_branches(&self.project_root).await {
            Ok(b) => b,
            Err(e) => return ActionResult::err(e),
        };
        let report: CleanupReport = agent_orchestrator::cleanup_obsolete(&mut project, &branches);
        for tree_id in &report.removed_trees {
            let _ = self.registry.delete_tree(&pid, tree_id, true).await;
        }
        ActionResult::ok(serde_json::to_value(report).unwrap_or(Value::Null))
    }

    async fn project_validate_integrity(&self, params: Value) -> ActionResult {
        let Some(pid) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let user_id = str_or(&params, "user_id", DEFAULT_USER);
        let mut project = match self.registry.get_project(&pid).await {
            Ok(p) => p,
            Err(e) => return ActionResult::err(e),
        };
        let stats = match self.stats_by_tree(&user_id, &pid, project.task_trees.keys().cloned()).await {
            Ok(s) => s,
            Err(e) => return ActionResult::err(e),
        };
        let counts: HashMap<String, u64> = stats.iter().map(|(k, v)| (k.clone(), v.total_tasks)).collect();
        let report: IntegrityReport = agent_orchestrator::validate_integrity(&mut project, &counts, &counts);
        if let Err(e) = self.registry.update_project(&pid, None, None).await {
            return ActionResult::err(e);
        }
        ActionResult::ok(serde_json::to_value(report).unwrap_or(Value::Null))
    }

    async fn project_rebalance_agents(&self, params: Value) -> ActionResult {
        let Some(pid) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let user_id = str_or(&params, "user_id", DEFAULT_USER);
        let mut project = match self.registry.get_project(&pid).await {
            Ok(p) => p,
            Err(e) => return ActionResult::err(e),
        };
        let mut workloads = HashMap::new();
        for tree_id in project.task_trees.keys() {
            let store = self.task_store(&user_id, &pid, tree_id).await;
            let tasks = match store.find_all(&TaskFilter::default()).await {
                Ok(t) => t,
                Err(e) => return ActionResult::err(e),
            };
            let todo_count = tasks.iter().filter(|t| !t.status.is_terminal()).count() as u64;
            let high_priority_todo_count = tasks
                .iter()
                .filter(|t| !t.status.is_terminal() && t.priority >= Priority::High)
                .count() as u64;
            let required_task_types: Vec<String> = tasks
                .iter()
                .flat_map(|t| t.labels.iter().cloned())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            workloads.insert(
                tree_id.clone(),
                TreeWorkload {
                    todo_count,
                    high_priority_todo_count,
                    required_task_types,
                },
            );
        }
        let before: std::collections::BTreeMap<_, _> = project.agent_assignments.clone().into_iter().collect();
        let report: RebalanceReport = agent_orchestrator::rebalance_agents(&mut project, &workloads);
        for (tree_id, agent_id) in &report.assignments {
            let already = before
                .get(agent_id)
                .map(|trees: &Vec<String>| trees.iter().any(|t| t == tree_id))
                .unwrap_or(false);
            if !already {
                if let Err(e) = self.registry.assign_agent_to_tree(&pid, agent_id, tree_id).await {
                    return ActionResult::err(e);
                }
            }
        }
        ActionResult::ok(serde_json::to_value(report).unwrap_or(Value::Null))
    }

    // ---- manage_task ---------------------------------------------------

    pub async fn manage_task(&self, action: &str, params: Value) -> ActionResult {
        let Some(project_id) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let tree_id = str_or(&params, "task_tree_id", DEFAULT_TREE);
        let user_id = str_or(&params, "user_id", DEFAULT_USER);
        let store = self.task_store(&user_id, &project_id, &tree_id).await;

        match action {
            "create" => self.task_create(&store, &project_id, params).await,
            "get" => {
                let Some(id) = task_id_field(&params) else {
                    return ActionResult::err(OrchestratorError::empty_field("task_id"));
                };
                match store.find_by_id(&id).await {
                    Ok(Some(task)) => ActionResult::ok(serde_json::to_value(task).unwrap_or(Value::Null)),
                    Ok(None) => ActionResult::err(OrchestratorError::task_not_found(&id)),
                    Err(e) => ActionResult::err(e),
                }
            }
            "update" => self.task_update(&store, params).await,
            "delete" => {
                let Some(id) = task_id_field(&params) else {
                    return ActionResult::err(OrchestratorError::empty_field("task_id"));
                };
                from_result(store.delete(&id).await)
            }
            "complete" => {
                let Some(id) = task_id_field(&params) else {
                    return ActionResult::err(OrchestratorError::empty_field("task_id"));
                };
                from_result(store.complete(&id).await)
            }
            "list" => from_result(store.find_all(&task_filter(&params)).await),
            "search" => {
                let query = str_or(&params, "query", "");
                let limit = usize_field(&params, "limit");
                from_result(store.search(&query, limit).await)
            }
            "next" => from_result(store.next_actionable().await),
            "add_dependency" => {
                let (Some(id), Some(dep)) = (task_id_field(&params), dep_id_field(&params)) else {
                    return ActionResult::err(OrchestratorError::empty_field("task_id/dependency_id"));
                };
                from_result(store.add_dependency(&id, dep).await)
            }
            "remove_dependency" => {
                let (Some(id), Some(dep)) = (task_id_field(&params), dep_id_field(&params)) else {
                    return ActionResult::err(OrchestratorError::empty_field("task_id/dependency_id"));
                };
                from_result(store.remove_dependency(&id, &dep).await)
            }
            other => ActionResult::bad_action("manage_task", other),
        }
    }

    async fn task_create(&self, store: &JsonTaskStore, project_id: &str, params: Value) -> ActionResult {
        let Some(title) = str_field(&params, "title") else {
            return ActionResult::err(OrchestratorError::empty_field("title"));
        };
        let new_task = NewTask {
            title,
            description: str_or(&params, "description", ""),
            status: params.get("status").and_then(|v| v.as_str()).and_then(parse_status),
            priority: params.get("priority").and_then(|v| v.as_str()).and_then(parse_priority),
            details: str_or(&params, "details", ""),
            estimated_effort: params
                .get("estimated_effort")
                .and_then(|v| v.as_str())
                .and_then(parse_effort),
            assignees: str_list(&params, "assignees"),
            labels: str_list(&params, "labels").into_iter().collect(),
            due_date: params
                .get("due_date")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok()),
            dependencies: str_list(&params, "dependencies")
                .into_iter()
                .filter_map(|s| TaskId::from_string(&s).ok())
                .collect(),
            project_id: project_id.to_string(),
        };
        if let Err(e) = TaskValidator::validate_new_task(&new_task) {
            return ActionResult::err(e);
        }
        let id = match params.get("task_id").and_then(|v| v.as_str()) {
            Some(raw) => match TaskId::from_string(raw) {
                Ok(id) => id,
                Err(e) => return ActionResult::err(e),
            },
            None => {
                let count = store.find_all(&TaskFilter::default()).await.map(|t| t.len()).unwrap_or(0);
                TaskId::from_int((count + 1) as u16)
            }
        };
        let now = chrono::Utc::now();
        let task = Task {
            id,
            title: new_task.title,
            description: new_task.description,
            status: new_task.status.unwrap_or(TaskStatus::Todo),
            priority: new_task.priority.unwrap_or(Priority::Medium),
            details: new_task.details,
            estimated_effort: new_task.estimated_effort,
            assignees: new_task.assignees,
            labels: new_task.labels,
            due_date: new_task.due_date,
            dependencies: new_task.dependencies,
            subtasks: Vec::new(),
            created_at: now,
            updated_at: now,
            context_id: None,
            project_id: new_task.project_id,
        };
        from_result(store.save(task).await)
    }

    async fn task_update(&self, store: &JsonTaskStore, params: Value) -> ActionResult {
        let Some(id) = task_id_field(&params) else {
            return ActionResult::err(OrchestratorError::empty_field("task_id"));
        };
        let mut task = match store.find_by_id(&id).await {
            Ok(Some(t)) => t,
            Ok(None) => return ActionResult::err(OrchestratorError::task_not_found(&id)),
            Err(e) => return ActionResult::err(e),
        };
        if let Some(title) = str_field(&params, "title") {
            task.title = title;
        }
        if let Some(description) = str_field(&params, "description") {
            task.description = description;
        }
        if let Some(status) = params.get("status").and_then(|v| v.as_str()).and_then(parse_status) {
            if let Err(e) = TaskValidator::validate_status_transition(task.status, status) {
                return ActionResult::err(e);
            }
            task.status = status;
        }
        if let Some(priority) = params.get("priority").and_then(|v| v.as_str()).and_then(parse_priority) {
            task.priority = priority;
        }
        if let Some(details) = str_field(&params, "details") {
            task.details = details;
        }
        if params.get("assignees").is_some() {
            task.assignees = str_list(&params, "assignees");
        }
        if params.get("labels").is_some() {
            task.labels = str_list(&params, "labels").into_iter().collect();
        }
        from_result(store.save(task).await)
    }

    // ---- manage_subtask -------------------------------------------------

    pub async fn manage_subtask(&self, action: &str, params: Value) -> ActionResult {
        let Some(project_id) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let tree_id = str_or(&params, "task_tree_id", DEFAULT_TREE);
        let user_id = str_or(&params, "user_id", DEFAULT_USER);
        let store = self.task_store(&user_id, &project_id, &tree_id).await;
        let Some(task_id) = task_id_field(&params) else {
            return ActionResult::err(OrchestratorError::empty_field("task_id"));
        };
        let mut task = match store.find_by_id(&task_id).await {
            Ok(Some(t)) => t,
            Ok(None) => return ActionResult::err(OrchestratorError::task_not_found(&task_id)),
            Err(e) => return ActionResult::err(e),
        };

        match action {
            "add" => {
                let Some(title) = str_field(&params, "title") else {
                    return ActionResult::err(OrchestratorError::empty_field("title"));
                };
                let sub_id = str_or(&params, "subtask_id", &format!("S{}", task.subtasks.len() + 1));
                let mut sub = orchestrator_core::models::task::Subtask::new(sub_id, title);
                sub.description = str_or(&params, "description", "");
                task.subtasks.push(sub);
            }
            "complete" => {
                let Some(sub_id) = str_field(&params, "subtask_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("subtask_id"));
                };
                match task.subtasks.iter_mut().find(|s| s.id == sub_id) {
                    Some(sub) => sub.completed = true,
                    None => return ActionResult::err(OrchestratorError::Validation(format!("no subtask '{sub_id}'"))),
                }
            }
            "update" => {
                let Some(sub_id) = str_field(&params, "subtask_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("subtask_id"));
                };
                match task.subtasks.iter_mut().find(|s| s.id == sub_id) {
                    Some(sub) => {
                        if let Some(title) = str_field(&params, "title") {
                            sub.title = title;
                        }
                        if let Some(description) = str_field(&params, "description") {
                            sub.description = description;
                        }
                    }
                    None => return ActionResult::err(OrchestratorError::Validation(format!("no subtask '{sub_id}'"))),
                }
            }
            "remove" => {
                let Some(sub_id) = str_field(&params, "subtask_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("subtask_id"));
                };
                let before = task.subtasks.len();
                task.subtasks.retain(|s| s.id != sub_id);
                if task.subtasks.len() == before {
                    return ActionResult::err(OrchestratorError::Validation(format!("no subtask '{sub_id}'")));
                }
            }
            "list" => return ActionResult::ok(serde_json::to_value(&task.subtasks).unwrap_or(Value::Null)),
            other => return ActionResult::bad_action("manage_subtask", other),
        }
        from_result(store.save(task).await)
    }

    // ---- manage_agent ---------------------------------------------------

    pub async fn manage_agent(&self, action: &str, params: Value) -> ActionResult {
        let Some(project_id) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };

        match action {
            "register" => {
                let Some(id) = str_field(&params, "agent_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("agent_id"));
                };
                let name = str_or(&params, "name", &id);
                let mut agent = Agent::new(id, name);
                agent.capabilities = str_list(&params, "capabilities");
                agent.preferred_task_types = str_list(&params, "preferred_task_types");
                from_result(self.registry.register_agent(&project_id, agent).await)
            }
            "assign" => {
                let (Some(agent_id), Some(tree_id)) =
                    (str_field(&params, "agent_id"), str_field(&params, "task_tree_id"))
                else {
                    return ActionResult::err(OrchestratorError::empty_field("agent_id/task_tree_id"));
                };
                from_result(self.registry.assign_agent_to_tree(&project_id, &agent_id, &tree_id).await)
            }
            "get" => {
                let Some(agent_id) = str_field(&params, "agent_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("agent_id"));
                };
                match self.registry.list_agents(&project_id).await {
                    Ok(agents) => match agents.into_iter().find(|a| a.id == agent_id) {
                        Some(agent) => ActionResult::ok(serde_json::to_value(agent).unwrap_or(Value::Null)),
                        None => ActionResult::err(OrchestratorError::AgentNotFound(agent_id)),
                    },
                    Err(e) => ActionResult::err(e),
                }
            }
            "list" => from_result(self.registry.list_agents(&project_id).await),
            "update" => {
                let Some(agent_id) = str_field(&params, "agent_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("agent_id"));
                };
                let updates = AgentUpdate {
                    name: str_field(&params, "name"),
                    call_agent: str_field(&params, "call_agent"),
                    capabilities: params.get("capabilities").map(|_| str_list(&params, "capabilities")),
                    expertise: None,
                    preferred_task_types: params
                        .get("preferred_task_types")
                        .map(|_| str_list(&params, "preferred_task_types")),
                };
                from_result(self.registry.update_agent(&project_id, &agent_id, updates).await)
            }
            "unregister" => {
                let Some(agent_id) = str_field(&params, "agent_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("agent_id"));
                };
                from_result(self.registry.unregister_agent(&project_id, &agent_id).await)
            }
            "rebalance" => self.project_rebalance_agents(params).await,
            other => ActionResult::bad_action("manage_agent", other),
        }
    }

    // ---- manage_context --------------------------------------------------

    pub async fn manage_context(&self, action: &str, params: Value) -> ActionResult {
        let Some(project_id) = str_field(&params, "project_id") else {
            return ActionResult::err(OrchestratorError::empty_field("project_id"));
        };
        let tree_id = str_or(&params, "task_tree_id", DEFAULT_TREE);
        let user_id = str_or(&params, "user_id", DEFAULT_USER);
        let ctx_store = self.context_store(&user_id, &project_id, &tree_id).await;

        if action == "list" {
            return from_result(ctx_store.list().await);
        }

        let Some(task_id) = str_field(&params, "task_id") else {
            return ActionResult::err(OrchestratorError::empty_field("task_id"));
        };

        match action {
            "create" => {
                let task_store = self.task_store(&user_id, &project_id, &tree_id).await;
                let id = match TaskId::from_string(&task_id) {
                    Ok(id) => id,
                    Err(e) => return ActionResult::err(e),
                };
                let task = match task_store.find_by_id(&id).await {
                    Ok(Some(t)) => t,
                    Ok(None) => return ActionResult::err(OrchestratorError::task_not_found(&id)),
                    Err(e) => return ActionResult::err(e),
                };
                from_result(ctx_store.create(&task).await)
            }
            "get" => match ctx_store.get(&task_id).await {
                Ok(Some(record)) => ActionResult::ok(serde_json::to_value(record).unwrap_or(Value::Null)),
                Ok(None) => ActionResult::err(OrchestratorError::ContextNotFound(task_id)),
                Err(e) => ActionResult::err(e),
            },
            "update" => {
                let record = match params.get("record").cloned().map(serde_json::from_value) {
                    Some(Ok(record)) => record,
                    _ => return ActionResult::err(OrchestratorError::Validation("invalid 'record' payload".into())),
                };
                from_result(ctx_store.update(&task_id, record).await)
            }
            "delete" => from_result(ctx_store.delete(&task_id).await),
            "get_property" => {
                let path = str_or(&params, "path", "");
                from_result(ctx_store.get_property(&task_id, &path).await)
            }
            "update_property" => {
                let path = str_or(&params, "path", "");
                let value = params.get("value").cloned().unwrap_or(Value::Null);
                from_result(ctx_store.update_property(&task_id, &path, value).await)
            }
            "merge" => {
                let data = params.get("data").cloned().unwrap_or(Value::Null);
                from_result(ctx_store.merge(&task_id, data).await)
            }
            "add_insight" => {
                let kind = match params.get("kind").and_then(|v| v.as_str()) {
                    Some("challenge") => InsightKind::Challenge,
                    Some("solution") => InsightKind::Solution,
                    Some("decision") => InsightKind::Decision,
                    _ => InsightKind::Insight,
                };
                let content = str_or(&params, "content", "");
                let agent = str_or(&params, "agent", "");
                from_result(ctx_store.add_insight(&task_id, kind, &content, &agent).await)
            }
            "add_progress" => {
                let agent = str_or(&params, "agent", "");
                let status = str_or(&params, "status", "");
                let description = str_or(&params, "description", "");
                from_result(ctx_store.add_progress_action(&task_id, &agent, &status, &description).await)
            }
            "update_next_steps" => {
                let steps = str_list(&params, "steps");
                from_result(ctx_store.update_next_steps(&task_id, steps).await)
            }
            other => ActionResult::bad_action("manage_context", other),
        }
    }

    // ---- manage_rule ------------------------------------------------------

    pub async fn manage_rule(&self, action: &str, params: Value) -> ActionResult {
        let store = self.rule_store();
        match action {
            "list" => from_result(store.list().await),
            "backup" => {
                let Some(dest) = str_field(&params, "destination") else {
                    return ActionResult::err(OrchestratorError::empty_field("destination"));
                };
                from_result(store.backup(&PathBuf::from(dest)).await)
            }
            "restore" => {
                let Some(src) = str_field(&params, "source") else {
                    return ActionResult::err(OrchestratorError::empty_field("source"));
                };
                from_result(store.restore(&PathBuf::from(src)).await)
            }
            "clean" => from_result(store.clean().await),
            "info" => {
                let Some(path) = str_field(&params, "path") else {
                    return ActionResult::err(OrchestratorError::empty_field("path"));
                };
                from_result(store.info(&store.root().join(path)).await)
            }
            "load_core" | "load_nested" => from_result(store.load_all().await),
            "parse_rule" => {
                let Some(path) = str_field(&params, "path") else {
                    return ActionResult::err(OrchestratorError::empty_field("path"));
                };
                from_result(RuleParser::parse(&store.root().join(path)).await)
            }
            "analyze_hierarchy" | "build_hierarchy" => {
                let hierarchy = match InheritanceResolver::load_hierarchy(store.root()).await {
                    Ok(h) => h,
                    Err(e) => return ActionResult::err(e),
                };
                from_result(InheritanceResolver::analyze(&hierarchy))
            }
            "validate_rule_hierarchy" => {
                let hierarchy = match InheritanceResolver::load_hierarchy(store.root()).await {
                    Ok(h) => h,
                    Err(e) => return ActionResult::err(e),
                };
                match InheritanceResolver::analyze(&hierarchy) {
                    Ok(analysis) => ActionResult::ok(json!({"valid": analysis.conflicts.is_empty(), "conflicts": analysis.conflicts})),
                    Err(e) => ActionResult::err(e),
                }
            }
            "get_dependencies" => from_result(store.dependency_map().await),
            "enhanced_info" => {
                let Some(path) = str_field(&params, "path") else {
                    return ActionResult::err(OrchestratorError::empty_field("path"));
                };
                let full_path = store.root().join(&path);
                let info = match store.info(&full_path).await {
                    Ok(i) => i,
                    Err(e) => return ActionResult::err(e),
                };
                let hierarchy = match InheritanceResolver::load_hierarchy(store.root()).await {
                    Ok(h) => h,
                    Err(e) => return ActionResult::err(e),
                };
                let analysis = match InheritanceResolver::analyze(&hierarchy) {
                    Ok(a) => a,
                    Err(e) => return ActionResult::err(e),
                };
                ActionResult::ok(json!({"info": info, "inheritance": analysis}))
            }
            "resolve_rule_inheritance" | "compose_nested_rules" => {
                let Some(path) = str_field(&params, "path") else {
                    return ActionResult::err(OrchestratorError::empty_field("path"));
                };
                let hierarchy = match InheritanceResolver::load_hierarchy(store.root()).await {
                    Ok(h) => h,
                    Err(e) => return ActionResult::err(e),
                };
                let analysis = match InheritanceResolver::analyze(&hierarchy) {
                    Ok(a) => a,
                    Err(e) => return ActionResult::err(e),
                };
                from_result(RuleComposer::compose(&store.root().join(path), &hierarchy, &analysis.inheritance_map))
            }
            "compose_rules" => {
                let paths = str_list(&params, "paths");
                let strategy = match params.get("strategy").and_then(|v| v.as_str()) {
                    Some("priority_merge") => CompositionStrategy::PriorityMerge,
                    Some("intelligent") => CompositionStrategy::Intelligent,
                    _ => CompositionStrategy::Sequential,
                };
                let mut rules = Vec::new();
                for p in paths {
                    match RuleParser::parse(&store.root().join(&p)).await {
                        Ok(r) => rules.push(r),
                        Err(e) => return ActionResult::err(e),
                    }
                }
                let Some(first) = rules.first() else {
                    return ActionResult::err(OrchestratorError::Validation("no rules to compose".into()));
                };
                let format = first.format;
                let composition = RuleComposer::compose_many(&rules, strategy, format);
                ActionResult::ok(serde_json::to_value(composition).unwrap_or(Value::Null))
            }
            "cache_status" => ActionResult::ok(serde_json::to_value(self.cache.stats().await).unwrap_or(Value::Null)),
            "register_client" => {
                let Some(config) = params.get("config").cloned().and_then(|v| serde_json::from_value::<ClientConfig>(v).ok())
                else {
                    return ActionResult::err(OrchestratorError::Validation("invalid client 'config'".into()));
                };
                from_result(self.client_sync.register_client(config).await)
            }
            "authenticate_client" => {
                let (Some(client_id), Some(credential)) =
                    (str_field(&params, "client_id"), str_field(&params, "credential"))
                else {
                    return ActionResult::err(OrchestratorError::empty_field("client_id/credential"));
                };
                from_result(self.client_sync.authenticate(&client_id, &credential).await)
            }
            "sync_client" => {
                let Some(client_id) = str_field(&params, "client_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("client_id"));
                };
                let operation = match params.get("operation").and_then(|v| v.as_str()) {
                    Some("pull") => SyncOperation::Pull,
                    Some("bidirectional") => SyncOperation::Bidirectional,
                    Some("merge") => SyncOperation::Merge,
                    _ => SyncOperation::Push,
                };
                let Some(remote_root) = str_field(&params, "remote_root") else {
                    return ActionResult::err(OrchestratorError::empty_field("remote_root"));
                };
                let remote = RuleStore::new(remote_root);
                from_result(self.client_sync.sync(&client_id, operation, &store, &remote).await)
            }
            "client_diff" => {
                let Some(remote_root) = str_field(&params, "remote_root") else {
                    return ActionResult::err(OrchestratorError::empty_field("remote_root"));
                };
                let remote = RuleStore::new(remote_root);
                from_result(ClientSync::diff(&store, &remote).await)
            }
            "resolve_conflicts" => {
                let conflicts: Vec<RuleConflict> = match params
                    .get("conflicts")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                {
                    Some(c) => c,
                    None => return ActionResult::err(OrchestratorError::Validation("invalid 'conflicts'".into())),
                };
                let strategy = match params.get("strategy").and_then(|v| v.as_str()) {
                    Some("append") => ConflictStrategy::Append,
                    Some("manual") => ConflictStrategy::Manual,
                    Some("merge") => ConflictStrategy::Merge,
                    _ => ConflictStrategy::Override,
                };
                let hierarchy = InheritanceResolver::load_hierarchy(store.root()).await.unwrap_or_default();
                let resolved = ClientSync::resolve_conflicts(&conflicts, strategy, &hierarchy, &hierarchy);
                ActionResult::ok(
                    json!(resolved.into_iter().map(|(p, c)| json!({"path": p, "content": c})).collect::<Vec<_>>()),
                )
            }
            "client_status" => {
                let Some(client_id) = str_field(&params, "client_id") else {
                    return ActionResult::err(OrchestratorError::empty_field("client_id"));
                };
                from_result(self.client_sync.status(&client_id).await)
            }
            "client_analytics" => ActionResult::ok(serde_json::to_value(self.client_sync.analytics().await).unwrap_or(Value::Null)),
            other => ActionResult::bad_action("manage_rule", other),
        }
    }

    // ---- call_agent ---------------------------------------------------

    pub async fn call_agent(&self, name_agent: &str) -> ActionResult {
        let agent_library_dir = orchestrator_core::project_analyzer::agent_library_dir(&self.project_root);
        from_result(self.role_provider.load_role(&agent_library_dir, name_agent).await)
    }

    /// Composes the `auto_rule.mdc` artifact for a task: role pack plus
    /// a phase-specific project scan, grounded on the teacher's
    /// write-with-fallback discipline for generated files.
    pub async fn generate_auto_rule(&self, task: &Task, role_name: &str) -> ActionResult {
        let content = match AutoRuleGenerator::generate_full_for_project(
            &self.project_root,
            task,
            role_name,
            self.role_provider.as_ref(),
        )
        .await
        {
            Ok(c) => c,
            Err(e) => return ActionResult::err(e),
        };
        let outcome = AutoRuleGenerator::write_artifact(&self.project_root, &content).await;
        ActionResult::ok(serde_json::to_value(outcome).unwrap_or(Value::Null))
    }
}

// ---- parameter extraction helpers -------------------------------------

fn str_field(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn str_or(params: &Value, key: &str, default: &str) -> String {
    str_field(params, key).unwrap_or_else(|| default.to_string())
}

fn bool_or(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn usize_field(params: &Value, key: &str) -> Option<usize> {
    params.get(key).and_then(|v| v.as_u64()).map(|n| n as usize)
}

fn str_list(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn task_id_field(params: &Value) -> Option<TaskId> {
    str_field(params, "task_id").and_then(|s| TaskId::from_string(&s).ok())
}

fn dep_id_field(params: &Value) -> Option<TaskId> {
    str_field(params, "dependency_id").and_then(|s| TaskId::from_string(&s).ok())
}

fn task_filter(params: &Value) -> TaskFilter {
    TaskFilter {
        status: params.get("status").and_then(|v| v.as_str()).and_then(parse_status),
        priority: params.get("priority").and_then(|v| v.as_str()).and_then(parse_priority),
        assignees: str_list(params, "assignees").into_iter().collect(),
        labels: str_list(params, "labels").into_iter().collect(),
        limit: usize_field(params, "limit"),
    }
}

fn parse_status(raw: &str) -> Option<TaskStatus> {
    match raw {
        "todo" => Some(TaskStatus::Todo),
        "in_progress" => Some(TaskStatus::InProgress),
        "blocked" => Some(TaskStatus::Blocked),
        "review" => Some(TaskStatus::Review),
        "testing" => Some(TaskStatus::Testing),
        "done" => Some(TaskStatus::Done),
        "cancelled" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

fn parse_priority(raw: &str) -> Option<Priority> {
    match raw {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "urgent" => Some(Priority::Urgent),
        "critical" => Some(Priority::Critical),
        _ => None,
    }
}

fn parse_effort(raw: &str) -> Option<EstimatedEffort> {
    match raw {
        "quick" => Some(EstimatedEffort::Quick),
        "short" => Some(EstimatedEffort::Short),
        "small" => Some(EstimatedEffort::Small),
        "medium" => Some(EstimatedEffort::Medium),
        "large" => Some(EstimatedEffort::Large),
        "xlarge" => Some(EstimatedEffort::Xlarge),
        "epic" => Some(EstimatedEffort::Epic),
        "massive" => Some(EstimatedEffort::Massive),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> (tempfile::TempDir, ToolFacade) {
        let dir = tempfile::tempdir().unwrap();
        let facade = ToolFacade::new(dir.path().join("data"), dir.path().join("repo"));
        (dir, facade)
    }

    #[tokio::test]
    async fn create_project_then_get_round_trips() {
        let (_dir, facade) = facade();
        let created = facade
            .manage_project("create", json!({"project_id": "web_app", "name": "Web App"}))
            .await;
        assert!(created.success);
        let fetched = facade.manage_project("get", json!({"project_id": "web_app"})).await;
        assert!(fetched.success);
        assert_eq!(fetched.payload["name"], "Web App");
    }

    #[tokio::test]
    async fn unknown_action_is_validation_error() {
        let (_dir, facade) = facade();
        let result = facade.manage_project("nonsense", json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Validation"));
    }

    #[tokio::test]
    async fn create_then_list_tasks() {
        let (_dir, facade) = facade();
        facade
            .manage_project("create", json!({"project_id": "web_app", "name": "Web App"}))
            .await;
        let created = facade
            .manage_task(
                "create",
                json!({"project_id": "web_app", "title": "Fix login bug", "priority": "high"}),
            )
            .await;
        assert!(created.success);
        let listed = facade.manage_task("list", json!({"project_id": "web_app"})).await;
        assert!(listed.success);
        assert_eq!(listed.payload.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn manage_agent_register_and_list() {
        let (_dir, facade) = facade();
        facade
            .manage_project("create", json!({"project_id": "web_app", "name": "Web App"}))
            .await;
        let registered = facade
            .manage_agent("register", json!({"project_id": "web_app", "agent_id": "coding_agent"}))
            .await;
        assert!(registered.success);
        let listed = facade.manage_agent("list", json!({"project_id": "web_app"})).await;
        assert_eq!(listed.payload.as_array().unwrap().len(), 1);
    }
}
