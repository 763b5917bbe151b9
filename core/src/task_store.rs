//! TaskStore (§4.1): per-(user,project,tree) JSON-backed task repository.
//!
//! Grounded on the teacher's `TaskRepository` trait (core/src/repository.rs):
//! the same async-trait shape, with `save`/`find_*`/`search` generalized
//! to the richer `Task` model and `next_actionable` added per spec.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::fsutil::{read_json, remove_dir_all_lenient, write_json_atomic};
use crate::ids::TaskId;
use crate::models::task::{Task, TaskFilter, TaskStatus};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>>;
    async fn find_all(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    /// Upsert; refreshes `updated_at` on every call (invariant I4).
    async fn save(&self, task: Task) -> Result<Task>;
    async fn delete(&self, id: &TaskId) -> Result<()>;
    async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Task>>;
    async fn next_actionable(&self) -> Result<Option<Task>>;
    async fn add_dependency(&self, id: &TaskId, dep: TaskId) -> Result<Task>;
    async fn remove_dependency(&self, id: &TaskId, dep: &TaskId) -> Result<Task>;
    async fn complete(&self, id: &TaskId) -> Result<Task>;
    async fn stats(&self) -> Result<TaskStoreStats>;
}

/// Aggregate statistics, grounded on the teacher's `RepositoryStats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStoreStats {
    pub total_tasks: u64,
    pub tasks_by_status: std::collections::HashMap<String, u64>,
    pub overdue: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TasksFileMetadata {
    version: String,
    project_id: String,
    task_tree_id: String,
    user_id: String,
    created: chrono::DateTime<Utc>,
    last_updated: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TasksFile {
    tasks: Vec<Task>,
    metadata: TasksFileMetadata,
}

/// JSON-file-backed implementation, one `tasks.json` per
/// `(user_id, project_id, tree_id)` scope.
pub struct JsonTaskStore {
    path: PathBuf,
    user_id: String,
    project_id: String,
    tree_id: String,
    lock: Arc<Mutex<()>>,
}

impl JsonTaskStore {
    pub fn new(
        rules_root: impl Into<PathBuf>,
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        tree_id: impl Into<String>,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        let user_id = user_id.into();
        let project_id = project_id.into();
        let tree_id = tree_id.into();
        let path = rules_root
            .into()
            .join("tasks")
            .join(&user_id)
            .join(&project_id)
            .join(&tree_id)
            .join("tasks.json");
        Self {
            path,
            user_id,
            project_id,
            tree_id,
            lock,
        }
    }

    async fn load(&self) -> Result<TasksFile> {
        match read_json::<TasksFile>(&self.path).await? {
            Some(file) => Ok(file),
            None => Ok(TasksFile {
                tasks: Vec::new(),
                metadata: TasksFileMetadata {
                    version: "1".to_string(),
                    project_id: self.project_id.clone(),
                    task_tree_id: self.tree_id.clone(),
                    user_id: self.user_id.clone(),
                    created: Utc::now(),
                    last_updated: Utc::now(),
                },
            }),
        }
    }

    async fn store(&self, mut file: TasksFile) -> Result<()> {
        file.metadata.last_updated = Utc::now();
        write_json_atomic(&self.path, &file).await
    }

    /// Invariant I3: would adding `dep` to `id` create a cycle in the
    /// dependency DAG? DFS from `dep` looking for a path back to `id`.
    fn creates_cycle(tasks: &[Task], id: &TaskId, dep: &TaskId) -> bool {
        if id == dep {
            return true;
        }
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        queue.push_back(dep.clone());
        while let Some(current) = queue.pop_front() {
            if &current == id {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(task) = tasks.iter().find(|t| t.id == current) {
                for next in &task.dependencies {
                    queue.push_back(next.clone());
                }
            }
        }
        false
    }

    /// Removes this scope's whole task directory (`tasks.json` and its
    /// parent dir), used when a tree or project is deleted.
    pub async fn delete_scope(&self) -> Result<()> {
        match self.path.parent() {
            Some(dir) => remove_dir_all_lenient(dir).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(file.tasks.into_iter().find(|t| &t.id == id))
    }

    async fn find_all(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        let mut tasks: Vec<Task> = file
            .tasks
            .into_iter()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| {
                filter.assignees.is_empty()
                    || t.assignees.iter().any(|a| filter.assignees.contains(a))
            })
            .filter(|t| {
                filter.labels.is_empty() || t.labels.iter().any(|l| filter.labels.contains(l))
            })
            .collect();
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    async fn save(&self, mut task: Task) -> Result<Task> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        task.updated_at = Utc::now();
        if let Some(existing) = file.tasks.iter_mut().find(|t| t.id == task.id) {
            task.created_at = existing.created_at;
            *existing = task.clone();
        } else {
            file.tasks.push(task.clone());
        }
        self.store(file).await?;
        Ok(task)
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let before = file.tasks.len();
        file.tasks.retain(|t| &t.id != id);
        if file.tasks.len() == before {
            return Err(OrchestratorError::task_not_found(id));
        }
        self.store(file).await
    }

    async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Task>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        let needle = query.to_lowercase();
        let mut matches: Vec<Task> = file
            .tasks
            .into_iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.description.to_lowercase().contains(&needle)
                    || t.details.to_lowercase().contains(&needle)
            })
            .collect();
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn next_actionable(&self) -> Result<Option<Task>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        let done: HashSet<TaskId> = file
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id.clone())
            .collect();

        let best = file
            .tasks
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .filter(|t| t.dependencies.iter().all(|d| done.contains(d)))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.due_date.cmp(&a.due_date).then(std::cmp::Ordering::Equal))
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });
        Ok(best)
    }

    async fn add_dependency(&self, id: &TaskId, dep: TaskId) -> Result<Task> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        if Self::creates_cycle(&file.tasks, id, &dep) {
            return Err(OrchestratorError::DependencyCycle(format!(
                "adding dependency {dep} to {id} would create a cycle"
            )));
        }
        let task = file
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| OrchestratorError::task_not_found(id))?;
        if !task.dependencies.contains(&dep) {
            task.dependencies.push(dep);
        }
        task.updated_at = Utc::now();
        let result = task.clone();
        self.store(file).await?;
        Ok(result)
    }

    async fn remove_dependency(&self, id: &TaskId, dep: &TaskId) -> Result<Task> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let task = file
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| OrchestratorError::task_not_found(id))?;
        task.dependencies.retain(|d| d != dep);
        task.updated_at = Utc::now();
        let result = task.clone();
        self.store(file).await?;
        Ok(result)
    }

    async fn complete(&self, id: &TaskId) -> Result<Task> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let task = file
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| OrchestratorError::task_not_found(id))?;
        task.complete(Utc::now());
        let result = task.clone();
        self.store(file).await?;
        Ok(result)
    }

    async fn stats(&self) -> Result<TaskStoreStats> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        let mut by_status = std::collections::HashMap::new();
        let mut overdue = 0u64;
        let today = Utc::now().date_naive();
        for task in &file.tasks {
            *by_status.entry(task.status.to_string()).or_insert(0u64) += 1;
            if let Some(due) = task.due_date {
                if due < today && !task.status.is_terminal() {
                    overdue += 1;
                }
            }
        }
        Ok(TaskStoreStats {
            total_tasks: file.tasks.len() as u64,
            tasks_by_status: by_status,
            overdue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::Priority;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, JsonTaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::new(
            dir.path(),
            "default_id",
            "web_app",
            "main",
            Arc::new(Mutex::new(())),
        );
        (dir, store)
    }

    fn task(id: &str, priority: Priority) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::from_string(id).unwrap(),
            title: format!("Task {id}"),
            description: String::new(),
            status: TaskStatus::Todo,
            priority,
            details: String::new(),
            estimated_effort: None,
            assignees: vec![],
            labels: Default::default(),
            due_date: None,
            dependencies: vec![],
            subtasks: vec![],
            created_at: now,
            updated_at: now,
            context_id: None,
            project_id: "web_app".to_string(),
        }
    }

    #[tokio::test]
    async fn save_then_retrieve_round_trips() {
        let (_dir, store) = store();
        let saved = store.save(task("T1", Priority::High)).await.unwrap();
        let fetched = store.find_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Task T1");
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn next_actionable_picks_highest_priority_unblocked_task() {
        let (_dir, store) = store();
        let t1 = store.save(task("T1", Priority::High)).await.unwrap();
        let mut t2 = task("T2", Priority::Critical);
        t2.dependencies.push(t1.id.clone());
        store.save(t2).await.unwrap();

        // T2 depends on T1, which is not done yet: T1 should win despite
        // lower priority than T2.
        let next = store.next_actionable().await.unwrap().unwrap();
        assert_eq!(next.id, t1.id);

        store.complete(&t1.id).await.unwrap();
        let next = store.next_actionable().await.unwrap().unwrap();
        assert_eq!(next.id.to_string(), "T2");
    }

    #[tokio::test]
    async fn next_actionable_none_when_all_terminal() {
        let (_dir, store) = store();
        let t1 = store.save(task("T1", Priority::Low)).await.unwrap();
        store.complete(&t1.id).await.unwrap();
        assert!(store.next_actionable().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_dependency_rejects_self_reference() {
        let (_dir, store) = store();
        let t1 = store.save(task("T1", Priority::Medium)).await.unwrap();
        let err = store.add_dependency(&t1.id, t1.id.clone()).await.unwrap_err();
        assert_eq!(err.kind(), "DependencyCycle");
    }

    #[tokio::test]
    async fn add_dependency_rejects_cycle() {
        let (_dir, store) = store();
        let t1 = store.save(task("T1", Priority::Medium)).await.unwrap();
        let t2 = store.save(task("T2", Priority::Medium)).await.unwrap();
        store.add_dependency(&t2.id, t1.id.clone()).await.unwrap();
        let err = store.add_dependency(&t1.id, t2.id.clone()).await.unwrap_err();
        assert_eq!(err.kind(), "DependencyCycle");
    }

    #[tokio::test]
    async fn complete_marks_subtasks_and_status() {
        let (_dir, store) = store();
        let mut t1 = task("T1", Priority::Medium);
        t1.subtasks.push(crate::models::task::Subtask::new("S1", "a"));
        store.save(t1.clone()).await.unwrap();
        let completed = store.complete(&t1.id).await.unwrap();
        assert_eq!(completed.status, TaskStatus::Done);
        assert!(completed.subtasks.iter().all(|s| s.completed));
    }

    #[tokio::test]
    async fn next_actionable_tie_break_by_due_date_then_created_at() {
        let (_dir, store) = store();
        let now = Utc::now();
        let mut early_due = task("T1", Priority::High);
        early_due.due_date = Some((now - Duration::days(1)).date_naive());
        let mut late_due = task("T2", Priority::High);
        late_due.due_date = Some((now + Duration::days(10)).date_naive());
        store.save(late_due).await.unwrap();
        store.save(early_due.clone()).await.unwrap();

        let next = store.next_actionable().await.unwrap().unwrap();
        assert_eq!(next.id, early_due.id);
    }
}
