//! InheritanceResolver (§4.7): parent-of detection, inheritance-type
//! classification, and cycle detection across a loaded rule hierarchy.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use orchestrator_core::error::{OrchestratorError, Result};

use crate::models::{InheritanceAnalysis, InheritanceEdge, InheritanceType, RuleConflictRecord, RuleFile};
use crate::parser::RuleParser;

/// Candidate parent filenames probed at each directory level, in order.
const PARENT_CANDIDATES: &[&str] = &["index.mdc", "base.mdc", "parent.mdc", "_base.mdc"];

pub struct InheritanceResolver;

impl InheritanceResolver {
    /// Loads every rule file under `dir`, keyed by path.
    pub async fn load_hierarchy(dir: &Path) -> Result<BTreeMap<PathBuf, RuleFile>> {
        let mut hierarchy = BTreeMap::new();
        let entries = {
            let dir = dir.to_path_buf();
            tokio::task::spawn_blocking(move || {
                walkdir::WalkDir::new(&dir)
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
            let file = RuleParser::parse(&path).await?;
            hierarchy.insert(path, file);
        }
        Ok(hierarchy)
    }

    /// Walks each rule's directory path upward looking for a parent
    /// candidate file, classifies the inheritance type, detects
    /// conflicts, and runs cycle detection over the resulting edges.
    pub fn analyze(hierarchy: &BTreeMap<PathBuf, RuleFile>) -> Result<InheritanceAnalysis> {
        let mut inheritance_map = Vec::new();
        let mut dependency_graph: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for (path, file) in hierarchy {
            let key = path.to_string_lossy().to_string();
            dependency_graph.insert(key, file.dependencies.clone());

            if let Some(parent_path) = find_parent(path, hierarchy) {
                let parent_file = &hierarchy[&parent_path];
                let inheritance_type = classify_inheritance(file, parent_file);
                inheritance_map.push(InheritanceEdge {
                    child: path.clone(),
                    parent: parent_path.clone(),
                    inheritance_type,
                });

                if file.rule_type != parent_file.rule_type {
                    conflicts.push(RuleConflictRecord {
                        path_a: path.clone(),
                        path_b: parent_path.clone(),
                        description: format!(
                            "rule type mismatch: {:?} inherits from {:?}",
                            file.rule_type, parent_file.rule_type
                        ),
                    });
                }
                for (var, value) in &file.variables {
                    if let Some(parent_value) = parent_file.variables.get(var) {
                        if !value.is_empty() && !parent_value.is_empty() && value != parent_value {
                            conflicts.push(RuleConflictRecord {
                                path_a: path.clone(),
                                path_b: parent_path.clone(),
                                description: format!("variable '{var}' value mismatch"),
                            });
                        }
                    }
                }
            }
        }

        detect_cycles(&inheritance_map)?;

        Ok(InheritanceAnalysis {
            inheritance_map,
            dependency_graph,
            conflicts,
        })
    }
}

/// Parent-of detection: walk the child's directory path upward,
/// probing each level (then the root) for a candidate filename.
fn find_parent(path: &Path, hierarchy: &BTreeMap<PathBuf, RuleFile>) -> Option<PathBuf> {
    let mut dir = path.parent()?.to_path_buf();
    loop {
        for candidate in PARENT_CANDIDATES {
            let candidate_path = dir.join(candidate);
            if candidate_path != *path && hierarchy.contains_key(&candidate_path) {
                return Some(candidate_path);
            }
        }
        let parent_dir = dir.parent()?.to_path_buf();
        if parent_dir == dir {
            break;
        }
        dir = parent_dir;
    }
    None
}

/// Explicit `inherit:` variable wins; else classify by section overlap.
fn classify_inheritance(child: &RuleFile, parent: &RuleFile) -> InheritanceType {
    if let Some(explicit) = child.variables.get("inherit") {
        return match explicit.to_uppercase().as_str() {
            "FULL" => InheritanceType::Full,
            "CONTENT" => InheritanceType::Content,
            "SELECTIVE" => InheritanceType::Selective,
            _ => InheritanceType::Metadata,
        };
    }

    if parent.sections.is_empty() {
        return InheritanceType::Metadata;
    }
    let shared = parent
        .sections
        .keys()
        .filter(|k| child.sections.contains_key(*k))
        .count();
    let overlap_ratio = shared as f64 / parent.sections.len() as f64;

    if shared == 0 {
        InheritanceType::Metadata
    } else if overlap_ratio >= 1.0 {
        InheritanceType::Full
    } else if overlap_ratio >= 0.7 {
        InheritanceType::Content
    } else {
        InheritanceType::Selective
    }
}

/// Depth-first traversal with a `visiting` set; revisiting a node still
/// in `visiting` raises a cycle error.
fn detect_cycles(edges: &[InheritanceEdge]) -> Result<()> {
    let mut children_of: BTreeMap<&Path, Vec<&Path>> = BTreeMap::new();
    for edge in edges {
        children_of.entry(&edge.parent).or_default().push(&edge.child);
    }

    let mut visiting: HashSet<&Path> = HashSet::new();
    let mut done: HashSet<&Path> = HashSet::new();

    fn visit<'a>(
        node: &'a Path,
        children_of: &BTreeMap<&'a Path, Vec<&'a Path>>,
        visiting: &mut HashSet<&'a Path>,
        done: &mut HashSet<&'a Path>,
    ) -> Result<()> {
        if done.contains(node) {
            return Ok(());
        }
        if !visiting.insert(node) {
            return Err(OrchestratorError::IntegrityViolation(format!(
                "circular rule dependency detected at {}",
                node.display()
            )));
        }
        if let Some(children) = children_of.get(node) {
            for child in children {
                visit(child, children_of, visiting, done)?;
            }
        }
        visiting.remove(node);
        done.insert(node);
        Ok(())
    }

    for edge in edges {
        visit(&edge.parent, &children_of, &mut visiting, &mut done)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RuleFormat, RuleType};
    use std::collections::BTreeMap as Map;

    fn file(path: &str, rule_type: RuleType, sections: &[&str]) -> RuleFile {
        RuleFile {
            path: PathBuf::from(path),
            format: RuleFormat::Mdc,
            rule_type,
            raw_content: String::new(),
            sections: sections.iter().map(|s| (s.to_string(), String::new())).collect(),
            references: Vec::new(),
            variables: Map::new(),
            dependencies: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn finds_parent_via_index_mdc_in_same_directory() {
        let mut hierarchy = BTreeMap::new();
        hierarchy.insert(
            PathBuf::from("agent/index.mdc"),
            file("agent/index.mdc", RuleType::Agent, &["rules"]),
        );
        hierarchy.insert(
            PathBuf::from("agent/coding.mdc"),
            file("agent/coding.mdc", RuleType::Agent, &["rules"]),
        );
        let analysis = InheritanceResolver::analyze(&hierarchy).unwrap();
        assert_eq!(analysis.inheritance_map.len(), 1);
        assert_eq!(analysis.inheritance_map[0].parent, PathBuf::from("agent/index.mdc"));
    }

    #[test]
    fn full_section_overlap_classifies_as_full() {
        let parent = file("core/base.mdc", RuleType::Core, &["rules", "tools"]);
        let child = file("core/child.mdc", RuleType::Core, &["rules", "tools"]);
        assert_eq!(classify_inheritance(&child, &parent), InheritanceType::Full);
    }

    #[test]
    fn no_overlap_classifies_as_metadata() {
        let parent = file("core/base.mdc", RuleType::Core, &["rules"]);
        let child = file("core/child.mdc", RuleType::Core, &["tools"]);
        assert_eq!(classify_inheritance(&child, &parent), InheritanceType::Metadata);
    }

    #[test]
    fn explicit_inherit_variable_wins_over_overlap() {
        let parent = file("core/base.mdc", RuleType::Core, &["rules"]);
        let mut child = file("core/child.mdc", RuleType::Core, &["tools"]);
        child.variables.insert("inherit".to_string(), "FULL".to_string());
        assert_eq!(classify_inheritance(&child, &parent), InheritanceType::Full);
    }

    #[test]
    fn detects_cycle_between_two_rules() {
        let edges = vec![
            InheritanceEdge {
                child: PathBuf::from("a.mdc"),
                parent: PathBuf::from("b.mdc"),
                inheritance_type: InheritanceType::Full,
            },
            InheritanceEdge {
                child: PathBuf::from("b.mdc"),
                parent: PathBuf::from("a.mdc"),
                inheritance_type: InheritanceType::Full,
            },
        ];
        assert!(detect_cycles(&edges).is_err());
    }

    #[test]
    fn type_mismatch_recorded_as_conflict() {
        let mut hierarchy = BTreeMap::new();
        hierarchy.insert(
            PathBuf::from("agent/index.mdc"),
            file("agent/index.mdc", RuleType::Agent, &["rules"]),
        );
        hierarchy.insert(
            PathBuf::from("agent/coding.mdc"),
            file("agent/coding.mdc", RuleType::Workflow, &["rules"]),
        );
        let analysis = InheritanceResolver::analyze(&hierarchy).unwrap();
        assert_eq!(analysis.conflicts.len(), 1);
    }
}
