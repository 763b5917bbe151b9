//! Business-rule validation for tasks, labels and projects.
//!
//! Grounded on the teacher's `TaskValidator` (core/src/validation.rs):
//! same shape (a namespace struct of associated functions, one
//! `Result<()>` per rule), generalized to the richer field set named in
//! §3 of the specification.

use crate::error::{OrchestratorError, Result};
use crate::models::task::{NewTask, TaskStatus};

/// Closed label vocabulary. Supplemented from `original_source`'s
/// `legacy/models.py` label set (§10 of SPEC_FULL.md).
pub const LABEL_VOCABULARY: &[&str] = &[
    "bug",
    "feature",
    "enhancement",
    "documentation",
    "refactor",
    "test",
    "security",
    "performance",
    "breaking-change",
];

pub struct TaskValidator;

impl TaskValidator {
    /// Task titles must be non-empty, trimmed, and at most 200 chars.
    pub fn validate_title(title: &str) -> Result<()> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(OrchestratorError::empty_field("title"));
        }
        if trimmed.len() > 200 {
            return Err(OrchestratorError::Validation(
                "title must be at most 200 characters long".to_string(),
            ));
        }
        Ok(())
    }

    /// Labels must be drawn from the closed vocabulary.
    pub fn validate_labels(labels: &std::collections::BTreeSet<String>) -> Result<()> {
        for label in labels {
            if !LABEL_VOCABULARY.contains(&label.as_str()) {
                return Err(OrchestratorError::Validation(format!(
                    "unknown label '{label}', must be one of {LABEL_VOCABULARY:?}"
                )));
            }
        }
        Ok(())
    }

    /// Agent identifiers: 1-50 chars, alnum/hyphen/underscore, must not
    /// start or end with a special character (beyond the leading `@`).
    pub fn validate_agent_id(name: &str) -> Result<()> {
        let bare = name.strip_prefix('@').unwrap_or(name);
        if bare.is_empty() {
            return Err(OrchestratorError::empty_field("assignee"));
        }
        if bare.len() > 50 {
            return Err(OrchestratorError::Validation(
                "agent identifier must be at most 50 characters long".to_string(),
            ));
        }
        let first = bare.chars().next().unwrap();
        let last = bare.chars().last().unwrap();
        if !first.is_alphanumeric() || !last.is_alphanumeric() {
            return Err(OrchestratorError::Validation(
                "agent identifier must start and end with a letter or number".to_string(),
            ));
        }
        if !bare.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(OrchestratorError::Validation(
                "agent identifier may only contain letters, numbers, hyphens and underscores"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        Self::validate_title(&task.title)?;
        Self::validate_labels(&task.labels)?;
        for assignee in &task.assignees {
            Self::validate_agent_id(assignee)?;
        }
        // Cycle detection requires the full task set and lives in TaskStore.
        Ok(())
    }

    /// Allowed terminal/non-terminal transitions mirror the open
    /// question in §9: the spec does not define a strict state machine
    /// like the teacher's `Task::can_transition_to`, so every
    /// non-identity transition is permitted except leaving a terminal
    /// state back into a non-terminal one without going through
    /// `Cancelled -> Todo` reopen, which the spec is silent on and we
    /// therefore allow (carry-forward: no guess beyond what's stated).
    pub fn validate_status_transition(current: TaskStatus, next: TaskStatus) -> Result<()> {
        if current == next {
            return Err(OrchestratorError::Validation(
                "task is already in that status".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn valid_titles() {
        assert!(TaskValidator::validate_title("Fix login bug").is_ok());
    }

    #[test]
    fn invalid_titles() {
        assert!(TaskValidator::validate_title("").is_err());
        assert!(TaskValidator::validate_title("   ").is_err());
        assert!(TaskValidator::validate_title(&"a".repeat(201)).is_err());
    }

    #[test]
    fn labels_must_be_in_vocabulary() {
        let mut labels = BTreeSet::new();
        labels.insert("bug".to_string());
        assert!(TaskValidator::validate_labels(&labels).is_ok());
        labels.insert("not-a-real-label".to_string());
        assert!(TaskValidator::validate_labels(&labels).is_err());
    }

    #[test]
    fn agent_ids_allow_leading_at() {
        assert!(TaskValidator::validate_agent_id("@coding-agent").is_ok());
        assert!(TaskValidator::validate_agent_id("coding_agent").is_ok());
        assert!(TaskValidator::validate_agent_id("@-bad").is_err());
        assert!(TaskValidator::validate_agent_id("").is_err());
    }
}
