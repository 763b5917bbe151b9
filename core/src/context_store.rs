//! ContextStore (§4.2): per-task structured context JSON with dot-path
//! access, deep merge, and insight/progress logging.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::fsutil::{read_json, remove_dir_all_lenient, write_json_atomic};
use crate::models::context::{ContextIndexEntry, ContextRecord, Insight, InsightKind, ProgressAction};
use crate::models::task::{Task, TaskStatus};

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Gated: only when `task.status == Todo`, no subtask is completed,
    /// and no context file already exists for this task.
    async fn create(&self, task: &Task) -> Result<ContextRecord>;
    async fn get(&self, task_id: &str) -> Result<Option<ContextRecord>>;
    async fn update(&self, task_id: &str, record: ContextRecord) -> Result<ContextRecord>;
    async fn delete(&self, task_id: &str) -> Result<()>;
    async fn exists(&self, task_id: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<ContextIndexEntry>>;
    async fn get_property(&self, task_id: &str, path: &str) -> Result<Value>;
    async fn update_property(&self, task_id: &str, path: &str, value: Value) -> Result<ContextRecord>;
    async fn merge(&self, task_id: &str, data: Value) -> Result<ContextRecord>;
    async fn add_insight(
        &self,
        task_id: &str,
        kind: InsightKind,
        content: &str,
        agent: &str,
    ) -> Result<ContextRecord>;
    async fn add_progress_action(
        &self,
        task_id: &str,
        agent: &str,
        status: &str,
        description: &str,
    ) -> Result<ContextRecord>;
    async fn update_next_steps(&self, task_id: &str, steps: Vec<String>) -> Result<ContextRecord>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContextsIndex {
    entries: Vec<ContextIndexEntry>,
}

pub struct JsonContextStore {
    contexts_dir: PathBuf,
    index_path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonContextStore {
    pub fn new(
        rules_root: impl Into<PathBuf>,
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        tree_id: impl Into<String>,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        let dir = rules_root
            .into()
            .join("contexts")
            .join(user_id.into())
            .join(project_id.into())
            .join(tree_id.into());
        Self {
            index_path: dir.join("contexts.json"),
            contexts_dir: dir,
            lock,
        }
    }

    fn file_path(&self, task_id: &str) -> PathBuf {
        self.contexts_dir.join(format!("context_{task_id}.json"))
    }

    async fn load_record(&self, task_id: &str) -> Result<Option<ContextRecord>> {
        read_json(&self.file_path(task_id)).await
    }

    async fn store_record(&self, task_id: &str, mut record: ContextRecord) -> Result<ContextRecord> {
        record.metadata.updated_at = Some(Utc::now());
        write_json_atomic(&self.file_path(task_id), &record).await?;
        self.refresh_index_entry(task_id, &record).await?;
        Ok(record)
    }

    async fn refresh_index_entry(&self, task_id: &str, record: &ContextRecord) -> Result<()> {
        let mut index: ContextsIndex = read_json(&self.index_path).await?.unwrap_or_default();
        index.entries.retain(|e| e.task_id != task_id);
        index.entries.push(ContextIndexEntry {
            task_id: task_id.to_string(),
            title: record.objective.title.clone(),
            status: record.metadata.status.clone(),
            assignees: record.metadata.assignees.clone(),
            file_path: self.file_path(task_id).to_string_lossy().to_string(),
            created_at: record.metadata.created_at.unwrap_or_else(Utc::now),
            updated_at: record.metadata.updated_at.unwrap_or_else(Utc::now),
        });
        write_json_atomic(&self.index_path, &index).await
    }

    async fn remove_index_entry(&self, task_id: &str) -> Result<()> {
        let mut index: ContextsIndex = read_json(&self.index_path).await?.unwrap_or_default();
        index.entries.retain(|e| e.task_id != task_id);
        write_json_atomic(&self.index_path, &index).await
    }

    /// Removes this scope's whole context directory (`contexts.json`,
    /// every `context_<task_id>.json`), used when a tree or project is
    /// deleted.
    pub async fn delete_scope(&self) -> Result<()> {
        remove_dir_all_lenient(&self.contexts_dir).await
    }
}

/// Dot-path navigation used by `get_property`/`update_property`. A
/// numeric segment indexes into an array; any other segment indexes
/// into an object.
fn get_path<'a>(root: &'a Value, path: &str) -> Result<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match segment.parse::<usize>() {
            Ok(index) => current
                .get(index)
                .ok_or_else(|| OrchestratorError::PathNotFound(path.to_string()))?,
            Err(_) => current
                .get(segment)
                .ok_or_else(|| OrchestratorError::PathNotFound(path.to_string()))?,
        };
    }
    Ok(current)
}

/// `update_property` auto-creates intermediate *object* segments that
/// are absent, but fails with `PathNotFound` when an intermediate
/// segment should be a list index that does not exist.
fn set_path(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    set_path_rec(root, &segments, value, path)
}

fn set_path_rec(current: &mut Value, segments: &[&str], value: Value, full_path: &str) -> Result<()> {
    let (head, rest) = segments
        .split_first()
        .expect("set_path called with empty path");

    if let Ok(index) = head.parse::<usize>() {
        let array = current
            .as_array_mut()
            .ok_or_else(|| OrchestratorError::PathNotFound(full_path.to_string()))?;
        if rest.is_empty() {
            if index >= array.len() {
                return Err(OrchestratorError::PathNotFound(full_path.to_string()));
            }
            array[index] = value;
            return Ok(());
        }
        let slot = array
            .get_mut(index)
            .ok_or_else(|| OrchestratorError::PathNotFound(full_path.to_string()))?;
        return set_path_rec(slot, rest, value, full_path);
    }

    if !current.is_object() {
        *current = Value::Object(serde_json::Map::new());
    }
    let map = current.as_object_mut().unwrap();

    if rest.is_empty() {
        map.insert((*head).to_string(), value);
        return Ok(());
    }

    let entry = map
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_path_rec(entry, rest, value, full_path)
}

/// Deep recursive merge: maps recurse, non-map leaves overwrite
/// (right-biased on overlapping leaves).
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

impl JsonContextStore {
    fn as_value(record: &ContextRecord) -> Result<Value> {
        serde_json::to_value(record).map_err(Into::into)
    }

    fn from_value(value: Value) -> Result<ContextRecord> {
        serde_json::from_value(value).map_err(Into::into)
    }
}

#[async_trait]
impl ContextStore for JsonContextStore {
    async fn create(&self, task: &Task) -> Result<ContextRecord> {
        let _guard = self.lock.lock().await;
        if task.status != TaskStatus::Todo {
            return Err(OrchestratorError::Validation(
                "context can only be created while the task is todo".to_string(),
            ));
        }
        if task.subtasks.iter().any(|s| s.completed) {
            return Err(OrchestratorError::Validation(
                "context cannot be created once a subtask is completed".to_string(),
            ));
        }
        if self.load_record(&task.id.to_string()).await?.is_some() {
            return Err(OrchestratorError::Validation(
                "context already exists for this task".to_string(),
            ));
        }

        let now = Utc::now();
        let mut record = ContextRecord::default();
        record.metadata.task_id = task.id.to_string();
        record.metadata.project_id = task.project_id.clone();
        record.metadata.status = task.status.to_string();
        record.metadata.priority = format!("{:?}", task.priority).to_lowercase();
        record.metadata.assignees = task.assignees.clone();
        record.metadata.labels = task.labels.iter().cloned().collect();
        record.metadata.created_at = Some(now);
        record.metadata.updated_at = Some(now);
        record.objective.title = task.title.clone();
        record.objective.description = task.description.clone();

        self.store_record(&task.id.to_string(), record).await
    }

    async fn get(&self, task_id: &str) -> Result<Option<ContextRecord>> {
        let _guard = self.lock.lock().await;
        self.load_record(task_id).await
    }

    async fn update(&self, task_id: &str, record: ContextRecord) -> Result<ContextRecord> {
        let _guard = self.lock.lock().await;
        if self.load_record(task_id).await?.is_none() {
            return Err(OrchestratorError::ContextNotFound(task_id.to_string()));
        }
        self.store_record(task_id, record).await
    }

    async fn delete(&self, task_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.load_record(task_id).await?.is_none() {
            return Err(OrchestratorError::ContextNotFound(task_id.to_string()));
        }
        tokio::fs::remove_file(self.file_path(task_id)).await?;
        self.remove_index_entry(task_id).await
    }

    async fn exists(&self, task_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.load_record(task_id).await?.is_some())
    }

    async fn list(&self) -> Result<Vec<ContextIndexEntry>> {
        let _guard = self.lock.lock().await;
        let index: ContextsIndex = read_json(&self.index_path).await?.unwrap_or_default();
        Ok(index.entries)
    }

    async fn get_property(&self, task_id: &str, path: &str) -> Result<Value> {
        let _guard = self.lock.lock().await;
        let record = self
            .load_record(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::ContextNotFound(task_id.to_string()))?;
        let value = Self::as_value(&record)?;
        get_path(&value, path).cloned()
    }

    async fn update_property(&self, task_id: &str, path: &str, value: Value) -> Result<ContextRecord> {
        let _guard = self.lock.lock().await;
        let record = self
            .load_record(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::ContextNotFound(task_id.to_string()))?;
        let mut json = Self::as_value(&record)?;
        set_path(&mut json, path, value)?;
        let updated = Self::from_value(json)?;
        self.store_record(task_id, updated).await
    }

    async fn merge(&self, task_id: &str, data: Value) -> Result<ContextRecord> {
        let _guard = self.lock.lock().await;
        let record = self
            .load_record(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::ContextNotFound(task_id.to_string()))?;
        let mut json = Self::as_value(&record)?;
        deep_merge(&mut json, data);
        let updated = Self::from_value(json)?;
        self.store_record(task_id, updated).await
    }

    async fn add_insight(
        &self,
        task_id: &str,
        kind: InsightKind,
        content: &str,
        agent: &str,
    ) -> Result<ContextRecord> {
        let _guard = self.lock.lock().await;
        let mut record = self
            .load_record(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::ContextNotFound(task_id.to_string()))?;
        record.notes.insights.push(Insight {
            kind,
            content: content.to_string(),
            agent: agent.to_string(),
            timestamp: Utc::now(),
        });
        self.store_record(task_id, record).await
    }

    async fn add_progress_action(
        &self,
        task_id: &str,
        agent: &str,
        status: &str,
        description: &str,
    ) -> Result<ContextRecord> {
        let _guard = self.lock.lock().await;
        let mut record = self
            .load_record(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::ContextNotFound(task_id.to_string()))?;
        record.progress.completed_actions.push(ProgressAction {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            status: status.to_string(),
            description: description.to_string(),
        });
        record.progress.current_session_summary.push_str(&format!(
            "\n[{agent}] {status}: {description}"
        ));
        self.store_record(task_id, record).await
    }

    async fn update_next_steps(&self, task_id: &str, steps: Vec<String>) -> Result<ContextRecord> {
        let _guard = self.lock.lock().await;
        let mut record = self
            .load_record(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::ContextNotFound(task_id.to_string()))?;
        record.progress.next_steps = steps;
        self.store_record(task_id, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TaskId;
    use crate::models::task::{Priority, TaskStatus};
    use serde_json::json;

    fn store() -> (tempfile::TempDir, JsonContextStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonContextStore::new(
            dir.path(),
            "default_id",
            "web_app",
            "main",
            Arc::new(Mutex::new(())),
        );
        (dir, store)
    }

    fn todo_task() -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::from_string("T1").unwrap(),
            title: "Fix login bug".into(),
            description: "desc".into(),
            status: TaskStatus::Todo,
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

    #[tokio::test]
    async fn create_gated_on_todo_status() {
        let (_dir, store) = store();
        let mut task = todo_task();
        task.status = TaskStatus::InProgress;
        assert!(store.create(&task).await.is_err());
    }

    #[tokio::test]
    async fn create_gated_on_no_completed_subtasks() {
        let (_dir, store) = store();
        let mut task = todo_task();
        let mut sub = crate::models::task::Subtask::new("S1", "a");
        sub.completed = true;
        task.subtasks.push(sub);
        assert!(store.create(&task).await.is_err());
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (_dir, store) = store();
        let task = todo_task();
        store.create(&task).await.unwrap();
        let record = store.get("T1").await.unwrap().unwrap();
        assert_eq!(record.objective.title, "Fix login bug");
    }

    #[tokio::test]
    async fn second_create_rejected() {
        let (_dir, store) = store();
        let task = todo_task();
        store.create(&task).await.unwrap();
        assert!(store.create(&task).await.is_err());
    }

    #[tokio::test]
    async fn update_property_then_get_property_round_trips() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        store
            .update_property("T1", "objective.title", json!("New title"))
            .await
            .unwrap();
        let value = store.get_property("T1", "objective.title").await.unwrap();
        assert_eq!(value, json!("New title"));
    }

    #[tokio::test]
    async fn update_property_auto_creates_intermediate_objects() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        store
            .update_property("T1", "requirements.custom.framework", json!("axum"))
            .await
            .unwrap();
        let value = store
            .get_property("T1", "requirements.custom.framework")
            .await
            .unwrap();
        assert_eq!(value, json!("axum"));
    }

    #[tokio::test]
    async fn update_property_missing_list_index_is_path_not_found() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        let err = store
            .update_property("T1", "technical.files.3", json!("main.rs"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PathNotFound");
    }

    #[tokio::test]
    async fn merge_is_right_biased_on_overlapping_leaves() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        store
            .merge("T1", json!({"objective": {"title": "Overwritten"}}))
            .await
            .unwrap();
        let record = store.get("T1").await.unwrap().unwrap();
        assert_eq!(record.objective.title, "Overwritten");
        // description untouched by the merge (disjoint key within the
        // same object).
        assert_eq!(record.objective.description, "desc");
    }

    #[tokio::test]
    async fn add_insight_defaults_kind_when_requested() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        let record = store
            .add_insight("T1", InsightKind::Challenge, "tricky auth edge case", "@coding-agent")
            .await
            .unwrap();
        assert_eq!(record.notes.insights.len(), 1);
        assert_eq!(record.notes.insights[0].kind, InsightKind::Challenge);
    }

    #[tokio::test]
    async fn add_progress_action_appends_session_summary() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        let record = store
            .add_progress_action("T1", "@coding-agent", "in_progress", "wired up JWT validation")
            .await
            .unwrap();
        assert_eq!(record.progress.completed_actions.len(), 1);
        assert!(record
            .progress
            .current_session_summary
            .contains("wired up JWT validation"));
    }

    #[tokio::test]
    async fn list_reflects_index_after_create() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_id, "T1");
    }

    #[tokio::test]
    async fn delete_removes_file_and_index_entry() {
        let (_dir, store) = store();
        store.create(&todo_task()).await.unwrap();
        store.delete("T1").await.unwrap();
        assert!(!store.exists("T1").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }
}
