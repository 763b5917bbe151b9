//! Task and subtask domain models (§3 of the specification).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::TaskId;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Review,
    Testing,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are excluded from `next_actionable` candidates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Review => "review",
            Self::Testing => "testing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Task priority, ordered critical > urgent > high > medium > low.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

/// Rough sizing of the work a task represents.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedEffort {
    Quick,
    Short,
    Small,
    Medium,
    Large,
    Xlarge,
    Epic,
    Massive,
}

/// A subtask nested under a `Task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress_notes: Vec<String>,
}

impl Subtask {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            assignee: None,
            completed: false,
            status: None,
            progress_notes: Vec::new(),
        }
    }
}

/// Aggregate subtask completion progress, per invariant I5.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SubtaskProgress {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

impl SubtaskProgress {
    pub fn from_subtasks(subtasks: &[Subtask]) -> Self {
        let total = subtasks.len();
        let completed = subtasks.iter().filter(|s| s.completed).count();
        let percentage = if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64) * 100.0
        };
        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// A task within a project's task tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub details: String,
    pub estimated_effort: Option<EstimatedEffort>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub context_id: Option<String>,
    pub project_id: String,
}

impl Task {
    /// Invariant I5: aggregate subtask completion.
    pub fn subtask_progress(&self) -> SubtaskProgress {
        SubtaskProgress::from_subtasks(&self.subtasks)
    }

    /// Invariant I2: completing a task marks every subtask completed and
    /// sets status=done atomically. Open Question (spec.md §9) resolved
    /// in favour of the source's behaviour: subtasks recorded as blocked
    /// are completed too, not rejected.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        for subtask in &mut self.subtasks {
            subtask.completed = true;
        }
        self.status = TaskStatus::Done;
        self.updated_at = now;
    }

    /// Invariant I3 guard: does the dependency set already contain `dep`,
    /// or would adding it create a self-reference.
    pub fn would_self_reference(&self, dep: &TaskId) -> bool {
        &self.id == dep
    }
}

/// Task data needed to create a new task (id/timestamps are assigned by
/// the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub details: String,
    pub estimated_effort: Option<EstimatedEffort>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    pub project_id: String,
}

/// Sparse update for an existing task: only `Some` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub details: Option<String>,
    pub estimated_effort: Option<Option<EstimatedEffort>>,
    pub assignees: Option<Vec<String>>,
    pub labels: Option<BTreeSet<String>>,
    pub due_date: Option<Option<NaiveDate>>,
}

/// Filter criteria used by `TaskStore::find_all`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignees: BTreeSet<String>,
    pub labels: BTreeSet<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_task(id: &str) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::from_string(id).unwrap(),
            title: "Fix login bug".into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::High,
            details: String::new(),
            estimated_effort: None,
            assignees: vec!["@coding-agent".into()],
            labels: BTreeSet::new(),
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
    fn subtask_progress_zero_when_empty() {
        let task = base_task("T1");
        let progress = task.subtask_progress();
        assert_eq!(progress.completed, 0);
        assert_eq!(progress.total, 0);
        assert_eq!(progress.percentage, 0.0);
    }

    #[test]
    fn subtask_progress_computes_percentage() {
        let mut task = base_task("T1");
        task.subtasks.push(Subtask::new("S1", "a"));
        task.subtasks.push(Subtask::new("S2", "b"));
        task.subtasks[0].completed = true;
        let progress = task.subtask_progress();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 2);
        assert_eq!(progress.percentage, 50.0);
    }

    #[test]
    fn complete_marks_all_subtasks_done() {
        let mut task = base_task("T1");
        task.subtasks.push(Subtask::new("S1", "a"));
        task.subtasks.push(Subtask::new("S2", "b"));
        task.complete(Utc::now());
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.subtasks.iter().all(|s| s.completed));
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::Urgent);
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }
}
