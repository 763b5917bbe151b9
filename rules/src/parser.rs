//! RuleParser (§4.6): format-aware rule file parsing.
//!
//! Grounded on the teacher's small-surface parsing style — one function
//! per concern, regexes built once via `once_cell`-free `Regex::new` at
//! call sites kept minimal — generalized from task/JSON parsing to the
//! richer header/section/reference/variable extraction the rule system
//! needs.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use orchestrator_core::error::Result;

use crate::models::{RuleFile, RuleFormat, RuleType};

pub struct RuleParser;

impl RuleParser {
    pub async fn parse(path: &Path) -> Result<RuleFile> {
        let format = RuleFormat::from_path(path);
        let raw_content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(RuleFile::empty(
                    path.to_path_buf(),
                    format,
                    format!("failed to read {}: {e}", path.display()),
                ))
            }
        };
        Ok(Self::parse_str(path.to_path_buf(), format, &raw_content))
    }

    pub fn parse_str(path: PathBuf, format: RuleFormat, raw_content: &str) -> RuleFile {
        match format {
            RuleFormat::Json => Self::parse_structured(path, format, raw_content, |s| {
                serde_json::from_str::<serde_json::Value>(s).map_err(|e| e.to_string())
            }),
            RuleFormat::Yaml => Self::parse_structured(path, format, raw_content, |s| {
                serde_yaml::from_str::<serde_json::Value>(s).map_err(|e| e.to_string())
            }),
            RuleFormat::Mdc | RuleFormat::Md | RuleFormat::Txt => {
                Self::parse_markdown_like(path, format, raw_content)
            }
        }
    }

    fn parse_structured(
        path: PathBuf,
        format: RuleFormat,
        raw_content: &str,
        decode: impl Fn(&str) -> std::result::Result<serde_json::Value, String>,
    ) -> RuleFile {
        let rule_type = classify_rule_type(&path, raw_content);
        match decode(raw_content) {
            Ok(value) => {
                let mut references = Vec::new();
                let mut dependencies = Vec::new();
                walk_structured_node(&value, &mut references, &mut dependencies);
                RuleFile {
                    path,
                    format,
                    rule_type,
                    raw_content: raw_content.to_string(),
                    sections: BTreeMap::new(),
                    references,
                    variables: BTreeMap::new(),
                    dependencies,
                    warnings: Vec::new(),
                }
            }
            Err(e) => RuleFile::empty(path, format, format!("malformed {format:?}: {e}")),
        }
    }

    fn parse_markdown_like(path: PathBuf, format: RuleFormat, raw_content: &str) -> RuleFile {
        let rule_type = classify_rule_type(&path, raw_content);
        let sections = split_sections(raw_content);
        let references = extract_references(raw_content);
        let variables = extract_variables(raw_content);
        let dependencies = extract_dependencies(raw_content);

        RuleFile {
            path,
            format,
            rule_type,
            raw_content: raw_content.to_string(),
            sections,
            references,
            variables,
            dependencies,
            warnings: Vec::new(),
        }
    }
}

/// Rule type classified from pathname first, then keyword fallback.
fn classify_rule_type(path: &Path, content: &str) -> RuleType {
    let path_str = path.to_string_lossy().to_lowercase();
    for (needle, rule_type) in [
        ("core/", RuleType::Core),
        ("workflow/", RuleType::Workflow),
        ("agent/", RuleType::Agent),
        ("project/", RuleType::Project),
        ("context/", RuleType::Context),
    ] {
        if path_str.contains(needle) {
            return rule_type;
        }
    }

    let lower = content.to_lowercase();
    for (needle, rule_type) in [
        ("core rule", RuleType::Core),
        ("workflow", RuleType::Workflow),
        ("agent role", RuleType::Agent),
        ("project convention", RuleType::Project),
        ("context", RuleType::Context),
    ] {
        if lower.contains(needle) {
            return rule_type;
        }
    }
    RuleType::Custom
}

/// Splits markdown-like content into header-normalized-name -> body,
/// keyed by `#`-prefixed header lines.
fn split_sections(content: &str) -> BTreeMap<String, String> {
    let header_re = Regex::new(r"^(#{1,6})\s+(.+)$").unwrap();
    let mut sections = BTreeMap::new();
    let mut current_key: Option<String> = None;
    let mut current_body = String::new();

    for line in content.lines() {
        if let Some(caps) = header_re.captures(line) {
            if let Some(key) = current_key.take() {
                sections.insert(key, current_body.trim().to_string());
            }
            current_key = Some(normalize_header(&caps[2]));
            current_body = String::new();
        } else if current_key.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if let Some(key) = current_key {
        sections.insert(key, current_body.trim().to_string());
    }
    sections
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Markdown links, `mdc:` refs, `@agent` handles.
fn extract_references(content: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let link_re = Regex::new(r"\[[^\]]*\]\(([^)]+)\)").unwrap();
    for caps in link_re.captures_iter(content) {
        refs.push(caps[1].to_string());
    }
    let mdc_re = Regex::new(r"mdc:([^\s)\]\"']+)").unwrap();
    for caps in mdc_re.captures_iter(content) {
        refs.push(format!("mdc:{}", &caps[1]));
    }
    let agent_re = Regex::new(r"@[a-zA-Z][a-zA-Z0-9_-]*").unwrap();
    for caps in agent_re.find_iter(content) {
        refs.push(caps.as_str().to_string());
    }
    refs.sort();
    refs.dedup();
    refs
}

/// `{{var}}`, `${var}`, `@VAR` patterns.
fn extract_variables(content: &str) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::new();
    let handlebars_re = Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").unwrap();
    for caps in handlebars_re.captures_iter(content) {
        variables.entry(caps[1].to_string()).or_insert_with(String::new);
    }
    let dollar_re = Regex::new(r"\$\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}").unwrap();
    for caps in dollar_re.captures_iter(content) {
        variables.entry(caps[1].to_string()).or_insert_with(String::new);
    }
    let at_var_re = Regex::new(r"@([A-Z][A-Z0-9_]*)\b").unwrap();
    for caps in at_var_re.captures_iter(content) {
        variables.entry(caps[1].to_string()).or_insert_with(String::new);
    }
    variables
}

/// `mdc:path`, `@import "path"`, `include: path`, `depends_on: [list]`.
fn extract_dependencies(content: &str) -> Vec<String> {
    let mut deps = Vec::new();

    let mdc_re = Regex::new(r"mdc:([^\s)\]\"']+)").unwrap();
    for caps in mdc_re.captures_iter(content) {
        deps.push(caps[1].to_string());
    }
    let import_re = Regex::new(r#"@import\s+"([^"]+)""#).unwrap();
    for caps in import_re.captures_iter(content) {
        deps.push(caps[1].to_string());
    }
    let include_re = Regex::new(r"(?m)^include:\s*(.+)$").unwrap();
    for caps in include_re.captures_iter(content) {
        deps.push(caps[1].trim().to_string());
    }
    let depends_on_re = Regex::new(r"(?m)^depends_on:\s*\[([^\]]*)\]").unwrap();
    for caps in depends_on_re.captures_iter(content) {
        for item in caps[1].split(',') {
            let item = item.trim().trim_matches('"').trim_matches('\'');
            if !item.is_empty() {
                deps.push(item.to_string());
            }
        }
    }

    deps.sort();
    deps.dedup();
    deps
}

/// Recursively scans a JSON/YAML document (as a `serde_json::Value`)
/// for string values shaped like references or dependency paths.
fn walk_structured_node(value: &serde_json::Value, references: &mut Vec<String>, dependencies: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => {
            if s.starts_with("mdc:") {
                dependencies.push(s.trim_start_matches("mdc:").to_string());
                references.push(s.clone());
            } else if s.contains("mdc:") || s.starts_with('@') || s.contains("](") {
                references.push(s.clone());
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk_structured_node(item, references, dependencies);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                if key == "depends_on" || key == "include" {
                    if let Some(s) = val.as_str() {
                        dependencies.push(s.to_string());
                    }
                    if let Some(arr) = val.as_array() {
                        for item in arr {
                            if let Some(s) = item.as_str() {
                                dependencies.push(s.to_string());
                            }
                        }
                    }
                }
                walk_structured_node(val, references, dependencies);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_type_from_path() {
        assert_eq!(
            classify_rule_type(Path::new("core/base.mdc"), ""),
            RuleType::Core
        );
        assert_eq!(
            classify_rule_type(Path::new("agent/coding_agent.mdc"), ""),
            RuleType::Agent
        );
    }

    #[test]
    fn classifies_type_from_keyword_fallback() {
        assert_eq!(
            classify_rule_type(Path::new("misc.mdc"), "This is a core rule for everyone."),
            RuleType::Core
        );
        assert_eq!(classify_rule_type(Path::new("misc.mdc"), "nothing special"), RuleType::Custom);
    }

    #[test]
    fn splits_sections_by_header() {
        let content = "# Title\nintro text\n## Rules\n- do this\n- do that\n";
        let sections = split_sections(content);
        assert_eq!(sections.get("title").unwrap(), "intro text");
        assert_eq!(sections.get("rules").unwrap(), "- do this\n- do that");
    }

    #[test]
    fn extracts_mdc_and_agent_references() {
        let content = "See [base](mdc:core/base.mdc) and ask @coding-agent for help.";
        let refs = extract_references(content);
        assert!(refs.contains(&"mdc:core/base.mdc".to_string()));
        assert!(refs.contains(&"@coding-agent".to_string()));
    }

    #[test]
    fn extracts_variables_across_syntaxes() {
        let content = "Hello {{name}}, your budget is ${BUDGET}. Use @TOKEN for auth.";
        let vars = extract_variables(content);
        assert!(vars.contains_key("name"));
        assert!(vars.contains_key("BUDGET"));
        assert!(vars.contains_key("TOKEN"));
    }

    #[test]
    fn extracts_dependencies_from_all_patterns() {
        let content = "mdc:core/base.mdc\n@import \"shared/util.mdc\"\ninclude: project/conventions.mdc\ndepends_on: [\"a.mdc\", \"b.mdc\"]\n";
        let deps = extract_dependencies(content);
        assert!(deps.contains(&"core/base.mdc".to_string()));
        assert!(deps.contains(&"shared/util.mdc".to_string()));
        assert!(deps.contains(&"project/conventions.mdc".to_string()));
        assert!(deps.contains(&"a.mdc".to_string()));
        assert!(deps.contains(&"b.mdc".to_string()));
    }

    #[test]
    fn malformed_json_yields_empty_structure_with_warning() {
        let file = RuleParser::parse_str(
            PathBuf::from("broken.json"),
            RuleFormat::Json,
            "{not valid json",
        );
        assert!(file.sections.is_empty());
        assert!(!file.warnings.is_empty());
    }

    #[tokio::test]
    async fn parse_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core/base.mdc");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "# Base\nshared conventions\n").await.unwrap();
        let file = RuleParser::parse(&path).await.unwrap();
        assert_eq!(file.rule_type, RuleType::Core);
        assert_eq!(file.sections.get("base").unwrap(), "shared conventions");
    }
}
