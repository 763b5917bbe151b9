//! Standard, deterministic test fixtures.

use orchestrator_core::models::project::{Agent, Project};
use orchestrator_core::models::task::{Task, TaskStatus};

use crate::builders::TaskBuilder;

/// A basic task with sensible defaults, in project "demo_project".
pub fn create_test_task() -> Task {
    TaskBuilder::new()
        .with_title("Write onboarding guide")
        .with_project("demo_project")
        .build()
}

/// One task in each `TaskStatus`, useful for exercising filters and
/// dashboards without relying on randomness.
pub fn create_tasks_in_all_statuses() -> Vec<Task> {
    [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Testing,
        TaskStatus::Done,
        TaskStatus::Cancelled,
    ]
    .into_iter()
    .enumerate()
    .map(|(i, status)| {
        TaskBuilder::new()
            .with_title(format!("Task in {status} state"))
            .with_status(status)
            .with_id(orchestrator_core::ids::TaskId::from_int(i as u16 + 1))
            .build()
    })
    .collect()
}

/// A project with one registered agent assigned to the main tree.
pub fn create_test_project() -> Project {
    let mut project = Project::new("demo_project", "Demo Project");
    let agent = Agent::new("rust-architect", "Rust Architect");
    project.registered_agents.insert(agent.id.clone(), agent);
    project
}
