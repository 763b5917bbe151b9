//! Runtime configuration: where data lives on disk and how verbose
//! logging should be. Grounded on the teacher's `config::Config`
//! layering (defaults, then `MCP_`-prefixed env overrides), narrowed
//! to the fields this binary actually needs.

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    /// Root for `tasks/`, `contexts/` and `projects.json`.
    pub data_root: PathBuf,
    /// Repository root: `.cursor/rules/`, `agent-library/`, git working tree.
    pub project_root: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Config {
    /// Build configuration from defaults, `MCP_`-prefixed environment
    /// overrides, and the project-root detection order below.
    pub fn from_env() -> Result<Self> {
        let project_root = detect_project_root();
        let data_root = env::var("PROJECTS_FILE_PATH")
            .ok()
            .map(|p| Path::new(&p).to_path_buf())
            .unwrap_or_else(|| brain_dir(&project_root));

        let mut config = Self {
            paths: PathsConfig {
                data_root,
                project_root,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        };

        let builder = ConfigBuilder::builder()
            .add_source(Environment::with_prefix("MCP").separator("_").try_parsing(true))
            .build()
            .context("failed to build configuration")?;

        if let Ok(level) = builder.get_string("logging.level") {
            config.logging.level = level;
        }
        if let Ok(root_path_env) = env::var("PROJECT_ROOT_PATH") {
            config.paths.project_root = PathBuf::from(root_path_env);
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(anyhow::anyhow!(
                    "invalid log level: {other}. Must be one of: trace, debug, info, warn, error"
                ));
            }
        }
        Ok(())
    }
}

/// `BRAIN_DIR_PATH` env var, or `<project_root>/.brain` by default.
fn brain_dir(project_root: &Path) -> PathBuf {
    env::var("BRAIN_DIR_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| project_root.join(".brain"))
}

/// Project-root detection priority: `PROJECT_ROOT_PATH` env var > cwd
/// with a `___root___` marker > walk parents for `___root___` > walk
/// for `.git` > walk for project markers > current working directory.
pub fn detect_project_root() -> PathBuf {
    if let Ok(explicit) = env::var("PROJECT_ROOT_PATH") {
        return PathBuf::from(explicit);
    }
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if cwd.join("___root___").exists() {
        return cwd;
    }
    if let Some(found) = walk_parents_for(&cwd, |dir| dir.join("___root___").exists()) {
        return found;
    }
    if let Some(found) = walk_parents_for(&cwd, |dir| dir.join(".git").exists()) {
        return found;
    }
    const MARKERS: &[&str] = &["pyproject.toml", "package.json", "Cargo.toml", "go.mod", ".cursor/rules"];
    if let Some(found) = walk_parents_for(&cwd, |dir| MARKERS.iter().any(|m| dir.join(m).exists())) {
        return found;
    }
    cwd
}

fn walk_parents_for(start: &Path, predicate: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        if predicate(dir) {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config {
            paths: PathsConfig {
                data_root: PathBuf::from("/tmp/data"),
                project_root: PathBuf::from("/tmp/project"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_log_level() {
        let config = Config {
            paths: PathsConfig {
                data_root: PathBuf::from("/tmp/data"),
                project_root: PathBuf::from("/tmp/project"),
            },
            logging: LoggingConfig {
                level: "invalid".to_string(),
                format: LogFormat::Pretty,
            },
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn walk_parents_finds_marker_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".git"), "").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let found = walk_parents_for(&nested, |d| d.join(".git").exists());
        assert_eq!(found.unwrap(), dir.path());
    }
}
