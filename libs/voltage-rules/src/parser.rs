//! Rule file loader
//!
//! Accepts YAML or JSON documents holding either a bare list of rules or a
//! `rules:` mapping, and validates what the harness relies on: unique names,
//! non-empty sensor references and well-formed actions.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Result, RuleError};
use crate::types::{Action, CompareOp, Condition, ConditionGroup, RuleDefinition};

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleDocument {
    List(Vec<RuleDefinition>),
    Wrapped { rules: Vec<RuleDefinition> },
}

impl RuleDocument {
    fn into_rules(self) -> Vec<RuleDefinition> {
        match self {
            RuleDocument::List(rules) | RuleDocument::Wrapped { rules } => rules,
        }
    }
}

/// Parse rules from YAML (or JSON, which YAML accepts) text
pub fn parse_rules_str(content: &str) -> Result<Vec<RuleDefinition>> {
    let document: RuleDocument = serde_yaml::from_str(content)?;
    let rules = document.into_rules();
    validate_rules(&rules)?;
    Ok(rules)
}

/// Load and validate rules from a `.yaml`/`.yml`/`.json` file
///
/// Each rule's `source_file` is set to the path it was read from.
pub fn load_rules_from_file(path: impl AsRef<Path>) -> Result<Vec<RuleDefinition>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let document: RuleDocument = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    let source = path.display().to_string();
    let mut rules = document.into_rules();
    for rule in &mut rules {
        if rule.source_file.is_none() {
            rule.source_file = Some(source.clone());
        }
    }

    validate_rules(&rules)?;
    debug!("Loaded {} rules from {}", rules.len(), source);
    Ok(rules)
}

/// Validate a rule set
pub fn validate_rules(rules: &[RuleDefinition]) -> Result<()> {
    let mut names = HashSet::new();
    for rule in rules {
        if rule.name.trim().is_empty() {
            return Err(RuleError::invalid("", "rule name is empty"));
        }
        if !names.insert(rule.name.as_str()) {
            return Err(RuleError::DuplicateName(rule.name.clone()));
        }
        validate_group(&rule.name, &rule.conditions)?;
        for action in &rule.actions {
            validate_action(&rule.name, action)?;
        }
    }
    Ok(())
}

fn validate_group(rule: &str, group: &ConditionGroup) -> Result<()> {
    group
        .children()
        .try_for_each(|condition| validate_condition(rule, condition))
}

fn validate_condition(rule: &str, condition: &Condition) -> Result<()> {
    match condition {
        Condition::Comparison(c) => {
            if c.sensor.trim().is_empty() && c.expression.is_none() {
                return Err(RuleError::invalid(rule, "comparison without sensor"));
            }
            if c.op().is_none() {
                warn!(rule, operator = %c.operator, "Unknown comparison operator");
            }
        },
        Condition::Expression(e) => {
            if e.expression.trim().is_empty() {
                return Err(RuleError::invalid(rule, "empty expression condition"));
            }
        },
        Condition::ThresholdOverTime(t) => {
            if t.sensor.trim().is_empty() {
                return Err(RuleError::invalid(rule, "threshold_over_time without sensor"));
            }
            if CompareOp::parse(&t.operator).is_none() {
                warn!(rule, operator = %t.operator, "Unknown temporal operator");
            }
        },
        Condition::Group(g) => validate_group(rule, g)?,
    }
    Ok(())
}

fn validate_action(rule: &str, action: &Action) -> Result<()> {
    match action {
        Action::SetValue {
            key,
            value,
            value_expression,
        } => {
            if key.trim().is_empty() {
                return Err(RuleError::invalid(rule, "set_value without key"));
            }
            if value.is_some() == value_expression.is_some() {
                return Err(RuleError::invalid(
                    rule,
                    format!("set_value '{}' needs exactly one of value / value_expression", key),
                ));
            }
        },
        Action::SendMessage {
            channel,
            message,
            message_expression,
        } => {
            if channel.trim().is_empty() {
                return Err(RuleError::invalid(rule, "send_message without channel"));
            }
            if message.is_some() == message_expression.is_some() {
                return Err(RuleError::invalid(
                    rule,
                    format!("send_message '{}' needs exactly one of message / message_expression", channel),
                ));
            }
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;
    use voltage_calc::Scalar;

    const RULES_YAML: &str = r#"
rules:
  - name: high_temp
    description: Raise alert when hot
    conditions:
      all:
        - type: comparison
          sensor: input:temperature
          operator: ">"
          value: 30
    actions:
      - type: set_value
        key: output:high_temp_alert
        value: true
  - name: report
    conditions:
      any:
        - type: expression
          expression: "output:high_temp_alert == true"
    actions:
      - type: send_message
        channel: alerts
        message_expression: "'temp=' + input:temperature"
"#;

    #[test]
    fn test_parse_wrapped_document() {
        let rules = parse_rules_str(RULES_YAML).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "high_temp");
        match &rules[0].conditions.all[0] {
            Condition::Comparison(c) => {
                assert_eq!(c.sensor, "input:temperature");
                assert_eq!(c.value, Scalar::Number(30.0));
            },
            other => panic!("unexpected condition {:?}", other),
        }
        assert_eq!(
            rules[0].output_keys().collect::<Vec<_>>(),
            vec!["output:high_temp_alert"]
        );
    }

    #[test]
    fn test_parse_bare_list() {
        let yaml = r#"
- name: a
  actions:
    - type: set_value
      key: output:x
      value_expression: "input:y * 2"
"#;
        let rules = parse_rules_str(yaml).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].conditions.is_empty());
        assert_eq!(rules[0].actions[0].expression(), Some("input:y * 2"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = "- name: a\n- name: a\n";
        assert!(matches!(
            parse_rules_str(yaml),
            Err(RuleError::DuplicateName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_empty_sensor_rejected() {
        let yaml = r#"
- name: a
  conditions:
    all:
      - type: group
        any:
          - type: threshold_over_time
            sensor: ""
            threshold: 5
            duration_ms: 1000
"#;
        assert!(matches!(
            parse_rules_str(yaml),
            Err(RuleError::Invalid { .. })
        ));
    }

    #[test]
    fn test_set_value_needs_exactly_one_source() {
        let yaml = r#"
- name: a
  actions:
    - type: set_value
      key: output:x
      value: 1
      value_expression: "2"
"#;
        assert!(matches!(
            parse_rules_str(yaml),
            Err(RuleError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_json_file_sets_source() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[{{"name": "j", "actions": [{{"type": "set_value", "key": "output:o", "value": "on"}}]}}]"#
        )
        .unwrap();

        let rules = load_rules_from_file(file.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].source_file.as_deref(),
            Some(file.path().display().to_string().as_str())
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            load_rules_from_file("/nonexistent/rules.yaml"),
            Err(RuleError::Io(_))
        ));
    }
}
