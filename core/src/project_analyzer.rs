//! ProjectAnalyzer: repo structure/framework/dependency scan plus
//! phase-specific guidance, used by [`crate::auto_rule_generator`]'s
//! full-generation path.
//!
//! Grounded on the original implementation's `pattern_detector.py`
//! (project-type scoring by file-presence evidence) and
//! `dependency_analyzer.py` (manifest parsing), reworked as a single
//! `walkdir`-based scan in the teacher's idiom.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::task::TaskStatus;

/// Phase derived from a task's status (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Coding,
    Testing,
    Review,
    Completed,
}

impl Phase {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Planning => "Planning",
            Self::Coding => "Coding",
            Self::Testing => "Testing",
            Self::Review => "Review",
            Self::Completed => "Completed",
        }
    }
}

/// `todo→planning, in_progress→coding, testing→testing, review→review,
/// done→completed, blocked→planning`.
pub fn phase_for_status(status: TaskStatus) -> Phase {
    match status {
        TaskStatus::Todo | TaskStatus::Blocked => Phase::Planning,
        TaskStatus::InProgress => Phase::Coding,
        TaskStatus::Testing => Phase::Testing,
        TaskStatus::Review => Phase::Review,
        TaskStatus::Done | TaskStatus::Cancelled => Phase::Completed,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectAnalysis {
    pub patterns: Vec<String>,
    pub frameworks: Vec<String>,
    pub dependencies: Vec<String>,
    pub structure: Vec<String>,
    pub phase_guidance: Vec<String>,
}

pub struct ProjectAnalyzer;

impl ProjectAnalyzer {
    /// Scans `root` for language/framework/dependency evidence and
    /// attaches guidance specific to `phase`. I/O errors while walking
    /// are swallowed per-entry (a single unreadable subtree should not
    /// abort the whole scan); only the top-level `root` read failing is
    /// surfaced.
    pub fn analyze(root: &Path, phase: Phase) -> Result<ProjectAnalysis> {
        if !root.exists() {
            return Ok(ProjectAnalysis {
                phase_guidance: Self::phase_guidance(phase),
                ..Default::default()
            });
        }

        let entries = Self::list_top_level(root);
        let patterns = Self::detect_patterns(root, &entries);
        let frameworks = Self::detect_frameworks(&entries);
        let dependencies = Self::detect_dependencies(root, &entries);
        let structure = Self::summarize_structure(root);

        Ok(ProjectAnalysis {
            patterns,
            frameworks,
            dependencies,
            structure,
            phase_guidance: Self::phase_guidance(phase),
        })
    }

    fn list_top_level(root: &Path) -> Vec<String> {
        std::fs::read_dir(root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_any_ext(root: &Path, ext: &str) -> bool {
        walkdir::WalkDir::new(root)
            .max_depth(4)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.path().extension().map(|e| e == ext).unwrap_or(false))
    }

    fn detect_patterns(root: &Path, top_level: &[String]) -> Vec<String> {
        let mut patterns = Vec::new();

        let has_cargo = top_level.contains(&"Cargo.toml".to_string());
        let has_package_json = top_level.contains(&"package.json".to_string());
        let has_pyproject = top_level.contains(&"pyproject.toml".to_string());
        let has_requirements = top_level.contains(&"requirements.txt".to_string());
        let has_go_mod = top_level.contains(&"go.mod".to_string());

        let rust_score = has_cargo as u32 + Self::has_any_ext(root, "rs") as u32;
        let node_score = has_package_json as u32 + top_level.contains(&"node_modules".to_string()) as u32;
        let python_score =
            has_pyproject as u32 + has_requirements as u32 + Self::has_any_ext(root, "py") as u32;

        if rust_score >= node_score && rust_score >= python_score && rust_score > 0 {
            patterns.push("Rust project".to_string());
            if top_level.contains(&"Cargo.lock".to_string()) {
                patterns.push("Cargo workspace with locked dependencies".to_string());
            }
        } else if node_score >= python_score && node_score > 0 {
            patterns.push("Node.js/JavaScript project".to_string());
        } else if python_score > 0 {
            patterns.push(if has_requirements {
                "Python project with pip dependencies".to_string()
            } else {
                "Python project".to_string()
            });
        }

        if has_go_mod {
            patterns.push("Go project".to_string());
        }
        if top_level.contains(&"src".to_string()) {
            patterns.push("Modular source-directory layout".to_string());
        }
        if top_level.iter().any(|f| f == "tests" || f == "test") {
            patterns.push("Dedicated test directory".to_string());
        }

        patterns
    }

    fn detect_frameworks(top_level: &[String]) -> Vec<String> {
        let mut frameworks = Vec::new();
        if top_level.contains(&".cursor".to_string()) {
            frameworks.push("Cursor rules workspace".to_string());
        }
        if top_level.contains(&"Dockerfile".to_string()) {
            frameworks.push("Containerized deployment".to_string());
        }
        if top_level.iter().any(|f| f.starts_with(".github")) {
            frameworks.push("GitHub Actions CI".to_string());
        }
        frameworks
    }

    /// Lightweight manifest scan: read top-level `Cargo.toml`/
    /// `package.json`/`requirements.txt` and surface their declared
    /// dependency names, without a full TOML/JSON/line parser.
    fn detect_dependencies(root: &Path, top_level: &[String]) -> Vec<String> {
        let mut dependencies = Vec::new();

        if top_level.contains(&"Cargo.toml".to_string()) {
            if let Ok(contents) = std::fs::read_to_string(root.join("Cargo.toml")) {
                dependencies.extend(Self::toml_dependency_names(&contents));
            }
        }
        if top_level.contains(&"requirements.txt".to_string()) {
            if let Ok(contents) = std::fs::read_to_string(root.join("requirements.txt")) {
                dependencies.extend(
                    contents
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#'))
                        .map(|l| {
                            l.split(|c: char| "=<>!~".contains(c))
                                .next()
                                .unwrap_or(l)
                                .trim()
                                .to_string()
                        }),
                );
            }
        }
        dependencies.sort();
        dependencies.dedup();
        dependencies
    }

    fn toml_dependency_names(contents: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut in_deps_section = false;
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                in_deps_section = trimmed.contains("dependencies");
                continue;
            }
            if in_deps_section {
                if let Some((name, _)) = trimmed.split_once('=') {
                    let name = name.trim();
                    if !name.is_empty() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names
    }

    fn summarize_structure(root: &Path) -> Vec<String> {
        walkdir::WalkDir::new(root)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != root && e.file_type().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect()
    }

    fn phase_guidance(phase: Phase) -> Vec<String> {
        match phase {
            Phase::Planning => vec![
                "Clarify acceptance criteria before writing code.".to_string(),
                "Break the task into subtasks if it spans more than one concern.".to_string(),
            ],
            Phase::Coding => vec![
                "Follow existing module conventions found during the scan.".to_string(),
                "Keep changes scoped to the task's stated files/directories.".to_string(),
            ],
            Phase::Testing => vec![
                "Add or update tests covering the new behavior.".to_string(),
                "Re-run the existing suite before marking testing complete.".to_string(),
            ],
            Phase::Review => vec![
                "Summarize what changed and why in the context notes.".to_string(),
                "Flag any follow-up work as a new task rather than scope-creeping this one."
                    .to_string(),
            ],
            Phase::Completed => vec!["No further action required.".to_string()],
        }
    }
}

/// Root-relative path helper used by the auto-rule generator when
/// deciding where the agent-library directory lives.
pub fn agent_library_dir(project_root: &Path) -> PathBuf {
    project_root.join("agent-library")
}
