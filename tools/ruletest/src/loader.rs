//! Rule and scenario input resolution

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use voltage_rules::{load_rules_from_file, validate_rules, RuleDefinition};
use voltage_ruletest::{ScenarioDocument, TestScenario};
use walkdir::WalkDir;

const RULE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| RULE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Expand files and directories (one level, sorted) into rule files
pub fn rule_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true)
                .sort_by_file_name()
            {
                let entry = entry
                    .with_context(|| format!("Failed to read directory {}", path.display()))?;
                if entry.file_type().is_file() && is_rule_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("Rule path not found: {}", path.display());
        }
    }
    Ok(files)
}

/// Load every rule file and validate the combined set
pub fn load_rules(paths: &[PathBuf]) -> Result<Vec<RuleDefinition>> {
    let files = rule_files(paths)?;
    if files.is_empty() {
        bail!("No rule files found");
    }

    let mut rules = Vec::new();
    for file in &files {
        let loaded = load_rules_from_file(file)
            .with_context(|| format!("Failed to load rules from {}", file.display()))?;
        debug!(file = %file.display(), rules = loaded.len(), "Loaded rule file");
        rules.extend(loaded);
    }
    validate_rules(&rules).context("Rule set validation failed")?;
    Ok(rules)
}

/// Load a scenario document
pub fn load_scenarios(path: &Path) -> Result<Vec<TestScenario>> {
    let document = ScenarioDocument::from_file(path)
        .with_context(|| format!("Failed to load scenarios from {}", path.display()))?;
    Ok(document.scenarios)
}

/// Keep scenarios whose name contains `filter`
pub fn filter_scenarios(scenarios: Vec<TestScenario>, filter: Option<&str>) -> Vec<TestScenario> {
    match filter {
        Some(filter) if !filter.is_empty() => scenarios
            .into_iter()
            .filter(|s| s.name.contains(filter))
            .collect(),
        _ => scenarios,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const RULE: &str = r#"
- name: {name}
  conditions:
    all:
      - type: comparison
        sensor: input:x
        operator: ">"
        value: 1
  actions:
    - type: set_value
      key: output:{name}
      value: true
"#;

    fn write_rule(dir: &Path, file: &str, name: &str) {
        std::fs::write(dir.join(file), RULE.replace("{name}", name)).unwrap();
    }

    #[test]
    fn test_directory_expansion_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_rule(dir.path(), "b.yaml", "b");
        write_rule(dir.path(), "a.yml", "a");
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_rule(&dir.path().join("nested"), "c.yaml", "c");

        let files = rule_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);

        let rules = load_rules(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[0].source_file.as_deref().unwrap().ends_with("a.yml"));
    }

    #[test]
    fn test_duplicate_names_across_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_rule(dir.path(), "one.yaml", "same");
        write_rule(dir.path(), "two.yaml", "same");
        assert!(load_rules(&[dir.path().to_path_buf()]).is_err());
    }

    #[test]
    fn test_missing_path() {
        let err = rule_files(&[PathBuf::from("/nonexistent/rules.yaml")]).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_filter() {
        let scenarios = vec![
            TestScenario::new("a_positive", ""),
            TestScenario::new("a_negative", ""),
            TestScenario::new("b_positive", ""),
        ];
        assert_eq!(filter_scenarios(scenarios.clone(), Some("positive")).len(), 2);
        assert_eq!(filter_scenarios(scenarios.clone(), Some("")).len(), 3);
        assert_eq!(filter_scenarios(scenarios, None).len(), 3);
    }
}
