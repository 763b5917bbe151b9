//! RuleStore: filesystem access to the rule library rooted at
//! `<project-root>/.cursor/rules`, backing the `manage_rule`
//! list/backup/restore/clean/info/load_core actions.
//!
//! Grounded on [`orchestrator_core::fsutil`]'s write-to-temp-then-rename
//! discipline, generalized here to whole-directory backup/restore via a
//! recursive copy (rule files are small text documents, not the
//! multi-gigabyte payloads atomic-rename-per-file would be needed for).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use orchestrator_core::error::{OrchestratorError, Result};

use crate::models::{RuleFile, RuleType};
use crate::parser::RuleParser;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleInfo {
    pub path: PathBuf,
    pub rule_type: RuleType,
    pub size: usize,
    pub section_count: usize,
    pub dependency_count: usize,
}

pub struct RuleStore {
    root: PathBuf,
}

impl RuleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists every rule file under the root (excluding the generated
    /// `auto_rule.mdc`, tasks/contexts/brain namespaces, which are not
    /// rule library content).
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            walkdir::WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .filter(|p| is_rule_path(&root, p))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| OrchestratorError::IOFailure(e.to_string()))
    }

    /// Parses every rule file found by [`Self::list`].
    pub async fn load_all(&self) -> Result<Vec<RuleFile>> {
        let mut files = Vec::new();
        for path in self.list().await? {
            files.push(RuleParser::parse(&path).await?);
        }
        Ok(files)
    }

    /// Loads only `core/` rules (the `load_core` action).
    pub async fn load_core(&self) -> Result<Vec<RuleFile>> {
        let all = self.load_all().await?;
        Ok(all.into_iter().filter(|f| f.rule_type == RuleType::Core).collect())
    }

    pub async fn info(&self, path: &Path) -> Result<RuleInfo> {
        let file = RuleParser::parse(path).await?;
        Ok(RuleInfo {
            path: file.path,
            rule_type: file.rule_type,
            size: file.size(),
            section_count: file.sections.len(),
            dependency_count: file.dependencies.len(),
        })
    }

    /// Recursively copies the whole rule library to `destination`.
    pub async fn backup(&self, destination: &Path) -> Result<usize> {
        let mut copied = 0;
        for path in self.list().await? {
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            let target = destination.join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&path, &target).await?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Restores the rule library from a prior [`Self::backup`] snapshot,
    /// overwriting any existing files at matching paths.
    pub async fn restore(&self, source: &Path) -> Result<usize> {
        if !source.exists() {
            return Err(OrchestratorError::PathNotFound(source.display().to_string()));
        }
        let mut restored = 0;
        let entries = {
            let source = source.to_path_buf();
            tokio::task::spawn_blocking(move || {
                walkdir::WalkDir::new(&source)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.path().to_path_buf())
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| OrchestratorError::IOFailure(e.to_string()))?
        };
        for path in entries {
            let relative = path.strip_prefix(source).unwrap_or(&path);
            let target = self.root.join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&path, &target).await?;
            restored += 1;
        }
        Ok(restored)
    }

    /// Removes the generated `auto_rule.mdc` artifact and any stray
    /// `.tmp-*` files left behind by an interrupted atomic write.
    pub async fn clean(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let auto_rule = self.root.join("auto_rule.mdc");
        if tokio::fs::try_exists(&auto_rule).await.unwrap_or(false) {
            tokio::fs::remove_file(&auto_rule).await?;
            removed.push(auto_rule);
        }
        for path in self.list().await? {
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.contains(".tmp-"))
                .unwrap_or(false)
            {
                tokio::fs::remove_file(&path).await?;
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Dependency map (path -> declared dependency path strings), the
    /// `get_dependencies` action.
    pub async fn dependency_map(&self) -> Result<BTreeMap<PathBuf, Vec<String>>> {
        let files = self.load_all().await?;
        Ok(files
            .into_iter()
            .map(|f| (f.path, f.dependencies))
            .collect())
    }
}

fn is_rule_path(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let first_component = relative
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_string());
    !matches!(first_component.as_deref(), Some("tasks") | Some("contexts") | Some("brain"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sample_store() -> (tempfile::TempDir, RuleStore) {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("core")).await.unwrap();
        tokio::fs::write(dir.path().join("core/base.mdc"), "# Base\nshared\n")
            .await
            .unwrap();
        tokio::fs::create_dir_all(dir.path().join("tasks/default_id/web_app/main"))
            .await
            .unwrap();
        tokio::fs::write(
            dir.path().join("tasks/default_id/web_app/main/tasks.json"),
            "{}",
        )
        .await
        .unwrap();
        let store = RuleStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn list_excludes_task_and_context_namespaces() {
        let (_dir, store) = sample_store().await;
        let files = store.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("core/base.mdc"));
    }

    #[tokio::test]
    async fn load_core_filters_by_rule_type() {
        let (_dir, store) = sample_store().await;
        let core_rules = store.load_core().await.unwrap();
        assert_eq!(core_rules.len(), 1);
        assert_eq!(core_rules[0].rule_type, RuleType::Core);
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips() {
        let (_dir, store) = sample_store().await;
        let backup_dir = tempfile::tempdir().unwrap();
        let copied = store.backup(backup_dir.path()).await.unwrap();
        assert_eq!(copied, 1);

        store.clean().await.unwrap();
        tokio::fs::remove_file(store.root().join("core/base.mdc")).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        let restored = store.restore(backup_dir.path()).await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clean_removes_stray_tmp_files() {
        let (_dir, store) = sample_store().await;
        tokio::fs::write(store.root().join("core/base.mdc.tmp-123"), "partial")
            .await
            .unwrap();
        let removed = store.clean().await.unwrap();
        assert_eq!(removed.len(), 1);
    }
}
