//! `GitProvider`: the subprocess boundary `sync_with_git` calls through.
//!
//! Grounded on the bounded-timeout subprocess pattern used for shell
//! execution in the pack (`agentor-builtins/src/shell.rs`): spawn under
//! `tokio::time::timeout`, kill the child on expiry rather than leaving
//! it to run unbounded.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::error::{OrchestratorError, Result};

/// Ceiling on any single git invocation (§4.4 sync_with_git).
pub const GIT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitStatus {
    pub branch: String,
    pub is_clean: bool,
    pub ahead: u32,
    pub behind: u32,
}

#[async_trait]
pub trait GitProvider: Send + Sync {
    async fn current_branch(&self, repo_root: &Path) -> Result<String>;
    async fn status(&self, repo_root: &Path) -> Result<GitStatus>;
    async fn pull(&self, repo_root: &Path) -> Result<()>;
    async fn push(&self, repo_root: &Path) -> Result<()>;
    /// All local branch names, used by `sync_with_git` to reconcile
    /// task trees against the repository. Always includes "main".
    async fn list_branches(&self, repo_root: &Path) -> Result<Vec<String>>;
}

/// Real implementation shelling out to the system `git` binary.
pub struct SystemGitProvider;

impl SystemGitProvider {
    async fn run(&self, repo_root: &Path, args: &[&str]) -> Result<String> {
        let output = tokio::time::timeout(
            GIT_TIMEOUT,
            Command::new("git").arg("-C").arg(repo_root).args(args).output(),
        )
        .await
        .map_err(|_| {
            OrchestratorError::Timeout(format!("git {} timed out after {:?}", args.join(" "), GIT_TIMEOUT))
        })?
        .map_err(|e| OrchestratorError::IOFailure(format!("failed to spawn git: {e}")))?;

        if !output.status.success() {
            return Err(OrchestratorError::IOFailure(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl GitProvider for SystemGitProvider {
    async fn current_branch(&self, repo_root: &Path) -> Result<String> {
        self.run(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn status(&self, repo_root: &Path) -> Result<GitStatus> {
        let branch = self.current_branch(repo_root).await?;
        let porcelain = self.run(repo_root, &["status", "--porcelain"]).await?;
        let is_clean = porcelain.is_empty();

        let counts = self
            .run(
                repo_root,
                &["rev-list", "--left-right", "--count", "HEAD...@{upstream}"],
            )
            .await
            .unwrap_or_default();
        let (ahead, behind) = parse_ahead_behind(&counts);

        Ok(GitStatus {
            branch,
            is_clean,
            ahead,
            behind,
        })
    }

    async fn pull(&self, repo_root: &Path) -> Result<()> {
        self.run(repo_root, &["pull", "--ff-only"]).await?;
        Ok(())
    }

    async fn push(&self, repo_root: &Path) -> Result<()> {
        self.run(repo_root, &["push"]).await?;
        Ok(())
    }

    async fn list_branches(&self, repo_root: &Path) -> Result<Vec<String>> {
        let raw = self
            .run(repo_root, &["branch", "--format=%(refname:short)"])
            .await?;
        let mut branches: Vec<String> = raw.lines().map(|l| l.trim().to_string()).collect();
        if !branches.iter().any(|b| b == "main") {
            branches.push("main".to_string());
        }
        Ok(branches)
    }
}

fn parse_ahead_behind(counts: &str) -> (u32, u32) {
    let mut parts = counts.split_whitespace();
    let ahead = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let behind = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (ahead, behind)
}

/// In-memory stand-in used by orchestrator tests and by callers that
/// don't have a real git repository on disk. Lives here (not in the
/// mocks crate) because `sync_with_git`'s unit tests need it directly.
#[derive(Debug, Clone, Default)]
pub struct FakeGitProvider {
    pub branch: String,
    pub clean: bool,
    pub ahead: u32,
    pub behind: u32,
    pub fail: bool,
    pub branches: Vec<String>,
}

impl FakeGitProvider {
    pub fn clean_on(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            clean: true,
            ahead: 0,
            behind: 0,
            fail: false,
            branches: Vec::new(),
        }
    }
}

#[async_trait]
impl GitProvider for FakeGitProvider {
    async fn current_branch(&self, _repo_root: &Path) -> Result<String> {
        if self.fail {
            return Err(OrchestratorError::IOFailure("fake git failure".to_string()));
        }
        Ok(self.branch.clone())
    }

    async fn status(&self, _repo_root: &Path) -> Result<GitStatus> {
        if self.fail {
            return Err(OrchestratorError::IOFailure("fake git failure".to_string()));
        }
        Ok(GitStatus {
            branch: self.branch.clone(),
            is_clean: self.clean,
            ahead: self.ahead,
            behind: self.behind,
        })
    }

    async fn pull(&self, _repo_root: &Path) -> Result<()> {
        if self.fail {
            return Err(OrchestratorError::IOFailure("fake git failure".to_string()));
        }
        Ok(())
    }

    async fn push(&self, _repo_root: &Path) -> Result<()> {
        if self.fail {
            return Err(OrchestratorError::IOFailure("fake git failure".to_string()));
        }
        Ok(())
    }

    async fn list_branches(&self, _repo_root: &Path) -> Result<Vec<String>> {
        if self.fail {
            return Err(OrchestratorError::IOFailure("fake git failure".to_string()));
        }
        let mut branches = self.branches.clone();
        if !branches.iter().any(|b| b == "main") {
            branches.push("main".to_string());
        }
        Ok(branches)
    }
}

/// No-op placeholder path used when no repository root is configured.
pub fn no_repo() -> PathBuf {
    PathBuf::new()
}
