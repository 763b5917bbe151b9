//! RuleComposer (§4.8): inheritance composition along a resolved chain,
//! and explicit N-way composition (sequential / priority_merge /
//! intelligent).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use orchestrator_core::error::Result;

use crate::models::{
    CompositionStrategy, ConflictStrategy, InheritanceEdge, ResolvedConflict, RuleFile, RuleFormat,
};

pub struct RuleComposer;

impl RuleComposer {
    /// Walks the inheritance chain from root parent down to `target`,
    /// inheriting missing sections and recording overrides, merging
    /// variables with the child taking precedence.
    pub fn compose(
        target_path: &Path,
        hierarchy: &BTreeMap<PathBuf, RuleFile>,
        inheritance_map: &[InheritanceEdge],
    ) -> Result<crate::models::Composition> {
        let chain = chain_to_root(target_path, inheritance_map);
        let target = &hierarchy[target_path];

        let mut sections: BTreeMap<String, String> = BTreeMap::new();
        let mut variables: BTreeMap<String, String> = BTreeMap::new();
        let mut resolved_conflicts = Vec::new();
        let mut sources = Vec::new();

        // chain is root-first; apply in order so later (closer to
        // target) entries override earlier ones.
        for path in &chain {
            let file = &hierarchy[path];
            sources.push(path.clone());
            for (section, body) in &file.sections {
                if let Some(existing) = sections.get(section) {
                    if existing != body {
                        resolved_conflicts.push(ResolvedConflict {
                            section: section.clone(),
                            strategy: ConflictStrategy::Override,
                            winning_source: path.display().to_string(),
                            discarded_sources: Vec::new(),
                        });
                    }
                }
                sections.insert(section.clone(), body.clone());
            }
            for (var, value) in &file.variables {
                variables.insert(var.clone(), value.clone());
            }
        }

        let content = render(target.format, &sections, &variables);
        Ok(crate::models::Composition {
            output_format: target.format,
            content,
            resolved_conflicts,
            sources,
        })
    }

    /// Explicit N-way composition over `rules` in the given order.
    pub fn compose_many(
        rules: &[RuleFile],
        strategy: CompositionStrategy,
        output_format: RuleFormat,
    ) -> crate::models::Composition {
        match strategy {
            CompositionStrategy::Sequential => compose_sequential(rules, output_format),
            CompositionStrategy::PriorityMerge => compose_priority_merge(rules, output_format),
            CompositionStrategy::Intelligent => compose_intelligent(rules, output_format),
        }
    }
}

/// Root-first ordered chain of ancestors ending at (and including) `target_path`.
fn chain_to_root(target_path: &Path, inheritance_map: &[InheritanceEdge]) -> Vec<PathBuf> {
    let mut chain = vec![target_path.to_path_buf()];
    let mut current = target_path.to_path_buf();
    while let Some(edge) = inheritance_map.iter().find(|e| e.child == current) {
        chain.push(edge.parent.clone());
        current = edge.parent.clone();
    }
    chain.reverse();
    chain
}

fn render(format: RuleFormat, sections: &BTreeMap<String, String>, variables: &BTreeMap<String, String>) -> String {
    match format {
        RuleFormat::Json | RuleFormat::Yaml => {
            let value = serde_json::json!({
                "sections": sections,
                "variables": variables,
            });
            if format == RuleFormat::Json {
                serde_json::to_string_pretty(&value).unwrap_or_default()
            } else {
                serde_yaml::to_string(&value).unwrap_or_default()
            }
        }
        RuleFormat::Mdc | RuleFormat::Md | RuleFormat::Txt => {
            let mut out = String::new();
            for (section, body) in sections {
                out.push_str(&format!("# {}\n{}\n\n", title_case(section), body));
            }
            out
        }
    }
}

fn title_case(section: &str) -> String {
    section
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic priority order for type-based sorting (§4.8): by rule
/// type rank, ties broken by descending size, then by path.
fn sort_key(rule: &RuleFile) -> (u8, std::cmp::Reverse<usize>, PathBuf) {
    (rule.rule_type.priority_rank(), std::cmp::Reverse(rule.size()), rule.path.clone())
}

fn sorted(rules: &[RuleFile]) -> Vec<&RuleFile> {
    let mut sorted: Vec<&RuleFile> = rules.iter().collect();
    sorted.sort_by_key(|r| sort_key(r));
    sorted
}

fn compose_sequential(rules: &[RuleFile], output_format: RuleFormat) -> crate::models::Composition {
    let ordered = sorted(rules);
    let mut content = String::new();
    for rule in &ordered {
        content.push_str(&format!(
            "<!-- source: {} -->\n{}\n\n",
            rule.path.display(),
            rule.raw_content.trim()
        ));
    }
    crate::models::Composition {
        output_format,
        content,
        resolved_conflicts: Vec::new(),
        sources: ordered.iter().map(|r| r.path.clone()).collect(),
    }
}

fn compose_priority_merge(rules: &[RuleFile], output_format: RuleFormat) -> crate::models::Composition {
    let ordered = sorted(rules);
    let mut sections: BTreeMap<String, (String, String)> = BTreeMap::new();
    let mut resolved_conflicts = Vec::new();

    for rule in &ordered {
        for (section, body) in &rule.sections {
            if let Some((_, existing_source)) = sections.get(section) {
                resolved_conflicts.push(ResolvedConflict {
                    section: section.clone(),
                    strategy: ConflictStrategy::Override,
                    winning_source: existing_source.clone(),
                    discarded_sources: vec![rule.path.display().to_string()],
                });
            } else {
                sections.insert(section.clone(), (body.clone(), rule.path.display().to_string()));
            }
        }
    }

    let rendered: BTreeMap<String, String> = sections
        .into_iter()
        .map(|(k, (body, _))| (k, body))
        .collect();
    let content = render(output_format, &rendered, &BTreeMap::new());

    crate::models::Composition {
        output_format,
        content,
        resolved_conflicts,
        sources: ordered.iter().map(|r| r.path.clone()).collect(),
    }
}

fn compose_intelligent(rules: &[RuleFile], output_format: RuleFormat) -> crate::models::Composition {
    let ordered = sorted(rules);
    let mut sections: BTreeMap<String, String> = BTreeMap::new();
    let mut variables: BTreeMap<String, String> = BTreeMap::new();
    let mut tags: BTreeSet<String> = BTreeSet::new();
    let mut dependencies: BTreeSet<String> = BTreeSet::new();
    let mut resolved_conflicts = Vec::new();

    for rule in &ordered {
        for (section, body) in &rule.sections {
            sections
                .entry(section.clone())
                .and_modify(|existing| {
                    if !existing.contains(body.as_str()) {
                        existing.push_str("\n\n");
                        existing.push_str(body);
                        resolved_conflicts.push(ResolvedConflict {
                            section: section.clone(),
                            strategy: ConflictStrategy::Append,
                            winning_source: rule.path.display().to_string(),
                            discarded_sources: Vec::new(),
                        });
                    }
                })
                .or_insert_with(|| body.clone());
        }
        for (var, value) in &rule.variables {
            variables
                .entry(var.clone())
                .and_modify(|existing| {
                    if existing != value && !value.is_empty() {
                        *existing = format!("{existing}, {value}");
                    }
                })
                .or_insert_with(|| value.clone());
        }
        dependencies.extend(rule.dependencies.iter().cloned());
        for reference in &rule.references {
            if reference.starts_with('@') {
                tags.insert(reference.clone());
            }
        }
    }

    let mut rendered = sections;
    if !tags.is_empty() {
        rendered.insert("tags".to_string(), tags.into_iter().collect::<Vec<_>>().join(", "));
    }
    if !dependencies.is_empty() {
        rendered.insert(
            "dependencies".to_string(),
            dependencies.into_iter().collect::<Vec<_>>().join(", "),
        );
    }
    let content = render(output_format, &rendered, &variables);

    crate::models::Composition {
        output_format,
        content,
        resolved_conflicts,
        sources: ordered.iter().map(|r| r.path.clone()).collect(),
    }
}
