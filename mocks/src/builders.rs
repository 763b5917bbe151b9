//! Fluent builders for constructing domain objects in tests.

use chrono::Utc;
use std::collections::BTreeSet;

use orchestrator_core::ids::TaskId;
use orchestrator_core::models::context::ContextRecord;
use orchestrator_core::models::project::{Agent, Project};
use orchestrator_core::models::task::{EstimatedEffort, Priority, Task, TaskStatus};

/// Builder for constructing `Task` instances in tests.
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: TaskId::from_int(1),
                title: "Test task".to_string(),
                description: "A test task".to_string(),
                status: TaskStatus::Todo,
                priority: Priority::Medium,
                details: String::new(),
                estimated_effort: None,
                assignees: Vec::new(),
                labels: BTreeSet::new(),
                due_date: None,
                dependencies: Vec::new(),
                subtasks: Vec::new(),
                created_at: now,
                updated_at: now,
                context_id: None,
                project_id: "test_project".to_string(),
            },
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_effort(mut self, effort: EstimatedEffort) -> Self {
        self.task.estimated_effort = Some(effort);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.task.assignees.push(assignee.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.task.labels.insert(label.into());
        self
    }

    pub fn with_dependency(mut self, dep: TaskId) -> Self {
        self.task.dependencies.push(dep);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.task.project_id = project_id.into();
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for constructing `Project` instances in tests.
pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: Project::new(id, name),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.project.description = description.into();
        self
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.project.registered_agents.insert(agent.id.clone(), agent);
        self
    }

    pub fn build(self) -> Project {
        self.project
    }
}

/// Builder for constructing `ContextRecord` instances in tests.
pub struct ContextRecordBuilder {
    record: ContextRecord,
}

impl Default for ContextRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRecordBuilder {
    pub fn new() -> Self {
        Self {
            record: ContextRecord::default(),
        }
    }

    pub fn with_task(mut self, task: &Task, project_id: impl Into<String>, tree_id: impl Into<String>) -> Self {
        self.record.metadata.task_id = task.id.to_string();
        self.record.metadata.project_id = project_id.into();
        self.record.metadata.tree_id = tree_id.into();
        self.record.metadata.status = task.status.to_string();
        self.record.metadata.priority = format!("{:?}", task.priority).to_lowercase();
        self.record.metadata.assignees = task.assignees.clone();
        self.record.metadata.labels = task.labels.iter().cloned().collect();
        self.record.objective.title = task.title.clone();
        self.record.objective.description = task.description.clone();
        self
    }

    pub fn with_next_steps(mut self, steps: Vec<String>) -> Self {
        self.record.progress.next_steps = steps;
        self
    }

    pub fn build(self) -> ContextRecord {
        self.record
    }
}
