//! Random test data generators and proptest strategies.

use chrono::Utc;
use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::Fake;
use proptest::prelude::*;
use rand::Rng;

use orchestrator_core::ids::TaskId;
use orchestrator_core::models::task::{Priority, Task, TaskStatus};

/// Generate a realistic agent id, e.g. "rust-architect".
pub fn generate_agent_id() -> String {
    let agents = [
        "rust-architect",
        "database-engineer",
        "protocol-specialist",
        "integration-lead",
        "testing-expert",
        "documentation-specialist",
        "security-auditor",
        "performance-optimizer",
    ];
    agents[rand::thread_rng().gen_range(0..agents.len())].to_string()
}

/// Generate a realistic task title.
pub fn generate_task_title() -> String {
    Sentence(3..8).fake()
}

/// Generate a realistic task description.
pub fn generate_task_description() -> String {
    Paragraph(2..5).fake()
}

pub fn generate_random_status() -> TaskStatus {
    let states = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Testing,
        TaskStatus::Done,
        TaskStatus::Cancelled,
    ];
    states[rand::thread_rng().gen_range(0..states.len())]
}

pub fn generate_random_priority() -> Priority {
    let priorities = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
        Priority::Critical,
    ];
    priorities[rand::thread_rng().gen_range(0..priorities.len())]
}

/// Generate a random task with realistic data, in a given project.
pub fn generate_random_task(project_id: &str) -> Task {
    let counter: u16 = (1..999).fake();
    let now = Utc::now();
    Task {
        id: TaskId::from_int(counter),
        title: generate_task_title(),
        description: generate_task_description(),
        status: generate_random_status(),
        priority: generate_random_priority(),
        details: String::new(),
        estimated_effort: None,
        assignees: vec![generate_agent_id()],
        labels: Default::default(),
        due_date: None,
        dependencies: Vec::new(),
        subtasks: Vec::new(),
        created_at: now,
        updated_at: now,
        context_id: None,
        project_id: project_id.to_string(),
    }
}

/// Configurable task generator, used where tests need a fixed pool of
/// agents rather than the global random pool above.
pub struct TaskGenerator {
    pub project_id: String,
    pub agent_pool: Vec<String>,
}

impl TaskGenerator {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            agent_pool: vec!["agent-1".to_string(), "agent-2".to_string(), "agent-3".to_string()],
        }
    }

    pub fn generate(&self) -> Task {
        let mut task = generate_random_task(&self.project_id);
        let agent = &self.agent_pool[rand::thread_rng().gen_range(0..self.agent_pool.len())];
        task.assignees = vec![agent.clone()];
        task
    }
}

/// Proptest strategy for generating valid task statuses.
pub fn task_status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Blocked),
        Just(TaskStatus::Review),
        Just(TaskStatus::Testing),
        Just(TaskStatus::Done),
        Just(TaskStatus::Cancelled),
    ]
}

/// Proptest strategy for generating valid priorities.
pub fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Urgent),
        Just(Priority::Critical),
    ]
}

/// Proptest strategy for generating complete tasks.
pub fn task_strategy() -> impl Strategy<Value = Task> {
    (
        1u16..999,
        "[A-Za-z ]{5,50}",
        "[A-Za-z0-9 .,!?]{10,200}",
        "[a-z-]{5,20}",
        task_status_strategy(),
        priority_strategy(),
    )
        .prop_map(|(counter, title, description, assignee, status, priority)| {
            let now = Utc::now();
            Task {
                id: TaskId::from_int(counter),
                title,
                description,
                status,
                priority,
                details: String::new(),
                estimated_effort: None,
                assignees: vec![assignee],
                labels: Default::default(),
                due_date: None,
                dependencies: Vec::new(),
                subtasks: Vec::new(),
                created_at: now,
                updated_at: now,
                context_id: None,
                project_id: "prop_project".to_string(),
            }
        })
}
