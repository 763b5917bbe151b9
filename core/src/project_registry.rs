//! ProjectRegistry (§4.1): the single `projects.json` catalog of
//! projects, trees and registered agents.
//!
//! Grounded on the teacher's repository-style `find`/`save` pair
//! (`core/src/task_store.rs` before this port), applied here to the
//! project-level aggregate instead of individual tasks, and protected
//! by the single process-wide registry mutex from [`crate::scope::ScopeLocks`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::fsutil::{read_json, write_json_atomic};
use crate::models::project::{Agent, AgentUpdate, Project, Tree, MAIN_TREE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeStatus {
    pub tree: Tree,
    pub assigned_agents: Vec<String>,
}

#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    async fn create_project(&self, id: &str, name: &str) -> Result<Project>;
    async fn get_project(&self, id: &str) -> Result<Project>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn update_project(&self, id: &str, name: Option<String>, description: Option<String>) -> Result<Project>;
    async fn create_tree(&self, project_id: &str, tree_id: &str, name: &str) -> Result<Tree>;
    /// Deleting `main` requires `force` (§9 invariant P1).
    async fn delete_tree(&self, project_id: &str, tree_id: &str, force: bool) -> Result<()>;
    /// Deletes the project itself; requires `force` when any tree
    /// other than `main` still exists.
    async fn delete_project(&self, project_id: &str, force: bool) -> Result<()>;
    async fn clear_tree(&self, project_id: &str, tree_id: &str) -> Result<()>;
    async fn get_tree_status(&self, project_id: &str, tree_id: &str) -> Result<TreeStatus>;
    async fn register_agent(&self, project_id: &str, agent: Agent) -> Result<Agent>;
    async fn assign_agent_to_tree(&self, project_id: &str, agent_id: &str, tree_id: &str) -> Result<Project>;
    async fn list_agents(&self, project_id: &str) -> Result<Vec<Agent>>;
    async fn update_agent(&self, project_id: &str, agent_id: &str, updates: AgentUpdate) -> Result<Agent>;
    /// Removes the agent and prunes its tree assignments.
    async fn unregister_agent(&self, project_id: &str, agent_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProjectsFile {
    projects: BTreeMap<String, Project>,
}

pub struct JsonProjectRegistry {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonProjectRegistry {
    pub fn new(rules_root: impl Into<PathBuf>, lock: Arc<Mutex<()>>) -> Self {
        Self {
            path: rules_root.into().join("projects.json"),
            lock,
        }
    }

    async fn load(&self) -> Result<ProjectsFile> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    async fn store(&self, file: &ProjectsFile) -> Result<()> {
        write_json_atomic(&self.path, file).await
    }
}

#[async_trait]
impl ProjectRegistry for JsonProjectRegistry {
    async fn create_project(&self, id: &str, name: &str) -> Result<Project> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        if file.projects.contains_key(id) {
            return Err(OrchestratorError::DuplicateId(format!(
                "project '{id}' already exists"
            )));
        }
        let project = Project::new(id, name);
        file.projects.insert(id.to_string(), project.clone());
        self.store(&file).await?;
        Ok(project)
    }

    async fn get_project(&self, id: &str) -> Result<Project> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        file.projects
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ProjectNotFound(id.to_string()))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(file.projects.into_values().collect())
    }

    async fn update_project(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Project> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(id.to_string()))?;
        if let Some(name) = name {
            project.name = name;
        }
        if let Some(description) = description {
            project.description = description;
        }
        project.touch();
        let updated = project.clone();
        self.store(&file).await?;
        Ok(updated)
    }

    async fn create_tree(&self, project_id: &str, tree_id: &str, name: &str) -> Result<Tree> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get_mut(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        if project.task_trees.contains_key(tree_id) {
            return Err(OrchestratorError::DuplicateId(format!(
                "tree '{tree_id}' already exists in project '{project_id}'"
            )));
        }
        let tree = Tree {
            id: tree_id.to_string(),
            name: name.to_string(),
            description: String::new(),
        };
        project.task_trees.insert(tree_id.to_string(), tree.clone());
        project.touch();
        self.store(&file).await?;
        Ok(tree)
    }

    async fn delete_tree(&self, project_id: &str, tree_id: &str, force: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get_mut(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        if tree_id == MAIN_TREE && !force {
            return Err(OrchestratorError::Validation(
                "the 'main' tree cannot be deleted without force".to_string(),
            ));
        }
        if !project.task_trees.contains_key(tree_id) {
            return Err(OrchestratorError::TreeNotFound(tree_id.to_string()));
        }
        project.task_trees.remove(tree_id);
        for trees in project.agent_assignments.values_mut() {
            trees.retain(|t| t != tree_id);
        }
        project.touch();
        self.store(&file).await?;
        Ok(())
    }

    async fn delete_project(&self, project_id: &str, force: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        let has_extra_trees = project.task_trees.keys().any(|t| t != MAIN_TREE);
        if has_extra_trees && !force {
            return Err(OrchestratorError::Validation(
                "project has non-main trees; use force to delete anyway".to_string(),
            ));
        }
        file.projects.remove(project_id);
        self.store(&file).await?;
        Ok(())
    }

    async fn clear_tree(&self, project_id: &str, tree_id: &str) -> Result<()> {
        // Clearing tasks themselves is TaskStore's job (it owns the
        // per-scope tasks.json); the registry only needs to confirm the
        // tree exists.
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        let project = file
            .projects
            .get(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        if !project.task_trees.contains_key(tree_id) {
            return Err(OrchestratorError::TreeNotFound(tree_id.to_string()));
        }
        Ok(())
    }

    async fn get_tree_status(&self, project_id: &str, tree_id: &str) -> Result<TreeStatus> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        let project = file
            .projects
            .get(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        let tree = project
            .task_trees
            .get(tree_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::TreeNotFound(tree_id.to_string()))?;
        let assigned_agents = project
            .agent_assignments
            .iter()
            .filter(|(_, trees)| trees.iter().any(|t| t == tree_id))
            .map(|(agent_id, _)| agent_id.clone())
            .collect();
        Ok(TreeStatus {
            tree,
            assigned_agents,
        })
    }

    async fn register_agent(&self, project_id: &str, agent: Agent) -> Result<Agent> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get_mut(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        if project.registered_agents.contains_key(&agent.id) {
            return Err(OrchestratorError::DuplicateId(format!(
                "agent '{}' already registered",
                agent.id
            )));
        }
        project
            .registered_agents
            .insert(agent.id.clone(), agent.clone());
        project.touch();
        self.store(&file).await?;
        Ok(agent)
    }

    async fn assign_agent_to_tree(
        &self,
        project_id: &str,
        agent_id: &str,
        tree_id: &str,
    ) -> Result<Project> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get_mut(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        if !project.registered_agents.contains_key(agent_id) {
            return Err(OrchestratorError::AgentNotFound(agent_id.to_string()));
        }
        if !project.task_trees.contains_key(tree_id) {
            return Err(OrchestratorError::TreeNotFound(tree_id.to_string()));
        }
        let trees = project
            .agent_assignments
            .entry(agent_id.to_string())
            .or_default();
        if !trees.iter().any(|t| t == tree_id) {
            trees.push(tree_id.to_string());
        }
        project.touch();
        let updated = project.clone();
        self.store(&file).await?;
        Ok(updated)
    }

    async fn list_agents(&self, project_id: &str) -> Result<Vec<Agent>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        let project = file
            .projects
            .get(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        Ok(project.registered_agents.values().cloned().collect())
    }

    async fn update_agent(&self, project_id: &str, agent_id: &str, updates: AgentUpdate) -> Result<Agent> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get_mut(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        let agent = project
            .registered_agents
            .get_mut(agent_id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(agent_id.to_string()))?;
        if let Some(name) = updates.name {
            agent.name = name;
        }
        if let Some(call_agent) = updates.call_agent {
            agent.call_agent = call_agent;
        }
        if let Some(capabilities) = updates.capabilities {
            agent.capabilities = capabilities;
        }
        if let Some(expertise) = updates.expertise {
            agent.expertise = expertise;
        }
        if let Some(preferred_task_types) = updates.preferred_task_types {
            agent.preferred_task_types = preferred_task_types;
        }
        let updated = agent.clone();
        project.touch();
        self.store(&file).await?;
        Ok(updated)
    }

    async fn unregister_agent(&self, project_id: &str, agent_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let project = file
            .projects
            .get_mut(project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        if project.registered_agents.remove(agent_id).is_none() {
            return Err(OrchestratorError::AgentNotFound(agent_id.to_string()));
        }
        project.agent_assignments.remove(agent_id);
        project.touch();
        self.store(&file).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, JsonProjectRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonProjectRegistry::new(dir.path(), Arc::new(Mutex::new(())));
        (dir, registry)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        let project = registry.get_project("web_app").await.unwrap();
        assert_eq!(project.name, "Web App");
        assert!(project.task_trees.contains_key(MAIN_TREE));
    }

    #[tokio::test]
    async fn duplicate_project_rejected() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        assert!(registry.create_project("web_app", "Dup").await.is_err());
    }

    #[tokio::test]
    async fn delete_main_tree_requires_force() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        assert!(registry
            .delete_tree("web_app", MAIN_TREE, false)
            .await
            .is_err());
        assert!(registry
            .delete_tree("web_app", MAIN_TREE, true)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn delete_project_requires_force_with_extra_trees() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        registry
            .create_tree("web_app", "feature_x", "Feature X")
            .await
            .unwrap();
        assert!(registry.delete_project("web_app", false).await.is_err());
        assert!(registry.delete_project("web_app", true).await.is_ok());
    }

    #[tokio::test]
    async fn register_agent_and_assign_to_tree() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        let agent = Agent::new("coding_agent", "Coding Agent");
        registry.register_agent("web_app", agent).await.unwrap();
        let project = registry
            .assign_agent_to_tree("web_app", "coding_agent", MAIN_TREE)
            .await
            .unwrap();
        assert_eq!(
            project.agent_assignments.get("coding_agent").unwrap(),
            &vec![MAIN_TREE.to_string()]
        );
    }

    #[tokio::test]
    async fn assign_unknown_agent_fails() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        let err = registry
            .assign_agent_to_tree("web_app", "ghost", MAIN_TREE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn get_tree_status_lists_assigned_agents() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        registry
            .register_agent("web_app", Agent::new("coding_agent", "Coding Agent"))
            .await
            .unwrap();
        registry
            .assign_agent_to_tree("web_app", "coding_agent", MAIN_TREE)
            .await
            .unwrap();
        let status = registry.get_tree_status("web_app", MAIN_TREE).await.unwrap();
        assert_eq!(status.assigned_agents, vec!["coding_agent".to_string()]);
    }

    #[tokio::test]
    async fn update_agent_applies_only_provided_fields() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        registry
            .register_agent("web_app", Agent::new("coding_agent", "Coding Agent"))
            .await
            .unwrap();
        let updated = registry
            .update_agent(
                "web_app",
                "coding_agent",
                AgentUpdate {
                    capabilities: Some(vec!["rust".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Coding Agent");
        assert_eq!(updated.capabilities, vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn unregister_agent_removes_assignments() {
        let (_dir, registry) = registry();
        registry.create_project("web_app", "Web App").await.unwrap();
        registry
            .register_agent("web_app", Agent::new("coding_agent", "Coding Agent"))
            .await
            .unwrap();
        registry
            .assign_agent_to_tree("web_app", "coding_agent", MAIN_TREE)
            .await
            .unwrap();
        registry.unregister_agent("web_app", "coding_agent").await.unwrap();
        let project = registry.get_project("web_app").await.unwrap();
        assert!(!project.registered_agents.contains_key("coding_agent"));
        assert!(!project.agent_assignments.contains_key("coding_agent"));
    }
}
