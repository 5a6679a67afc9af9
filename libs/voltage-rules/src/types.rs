//! Rule definition type definitions
//!
//! Core types for rule files:
//! - RuleDefinition: named rule with a condition tree and actions
//! - Condition: comparison, expression, threshold-over-time and group nodes
//! - Action: set-value and send-message
//!
//! All sum types carry an explicit `type` discriminant in rule files.

use serde::{Deserialize, Serialize};
use std::fmt;
use voltage_calc::Scalar;

/// Store key prefixes that name a domain
pub const DOMAIN_PREFIXES: [&str; 4] = ["input:", "output:", "state:", "buffer:"];

/// Prefix of keys the engine writes and the harness verifies
pub const OUTPUT_PREFIX: &str = "output:";

/// Prefix of sensor keys the harness drives
pub const INPUT_PREFIX: &str = "input:";

// ============================================================================
// Rule
// ============================================================================

/// Rule definition as loaded from a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Rule name, unique within a rule set
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// File the rule was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// Root condition group
    #[serde(default)]
    pub conditions: ConditionGroup,

    /// Actions executed when the conditions hold
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl RuleDefinition {
    /// `output:` keys written by this rule's set-value actions
    pub fn output_keys(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(Action::output_key)
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Condition tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// `sensor <op> value`
    Comparison(ComparisonCondition),
    /// Free-form boolean expression over store keys
    Expression(ExpressionCondition),
    /// Comparison that must hold continuously for a duration
    ThresholdOverTime(ThresholdOverTimeCondition),
    /// Nested all/any group
    Group(ConditionGroup),
}

/// Single comparison against a literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonCondition {
    pub sensor: String,
    pub operator: String,
    pub value: Scalar,
    /// Optional embedded expression evaluated by the engine in place of the sensor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl ComparisonCondition {
    pub fn new(
        sensor: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Scalar>,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            operator: operator.into(),
            value: value.into(),
            expression: None,
        }
    }

    /// Parsed operator, `None` when unrecognised
    pub fn op(&self) -> Option<CompareOp> {
        CompareOp::parse(&self.operator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionCondition {
    pub expression: String,
}

/// Comparison that must hold for at least `duration_ms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverTimeCondition {
    pub sensor: String,
    #[serde(default = "default_temporal_operator")]
    pub operator: String,
    pub threshold: f64,
    pub duration_ms: u64,
}

fn default_temporal_operator() -> String {
    ">".to_string()
}

impl ThresholdOverTimeCondition {
    pub fn new(sensor: impl Into<String>, threshold: f64, duration_ms: u64) -> Self {
        Self {
            sensor: sensor.into(),
            operator: default_temporal_operator(),
            threshold,
            duration_ms,
        }
    }

    /// The instantaneous comparison that must keep holding
    pub fn as_comparison(&self) -> ComparisonCondition {
        ComparisonCondition::new(
            self.sensor.clone(),
            self.operator.clone(),
            Scalar::Number(self.threshold),
        )
    }
}

/// Conjunction of `all` AND disjunction of `any`
///
/// Empty `all` is vacuously true, empty `any` is vacuously false. A group with
/// an empty `any` list places no disjunctive constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<Condition>,
}

impl ConditionGroup {
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self {
            all: conditions,
            any: Vec::new(),
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self {
            all: Vec::new(),
            any: conditions,
        }
    }

    /// Children of both lists, `all` first
    pub fn children(&self) -> impl Iterator<Item = &Condition> {
        self.all.iter().chain(self.any.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty()
    }
}

// ============================================================================
// Comparison operators
// ============================================================================

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl CompareOp {
    /// Parse operator text; `=` is accepted as an alias of `==`
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// Whether `lhs <op> rhs` holds
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Rule action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Write a value (static or computed) to a store key
    SetValue {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Scalar>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_expression: Option<String>,
    },
    /// Publish a message on a channel
    SendMessage {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_expression: Option<String>,
    },
}

impl Action {
    pub fn set_value(key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Action::SetValue {
            key: key.into(),
            value: Some(value.into()),
            value_expression: None,
        }
    }

    pub fn set_expression(key: impl Into<String>, expression: impl Into<String>) -> Self {
        Action::SetValue {
            key: key.into(),
            value: None,
            value_expression: Some(expression.into()),
        }
    }

    /// Key written by a set-value action targeting `output:`
    pub fn output_key(&self) -> Option<&str> {
        match self {
            Action::SetValue { key, .. } if key.starts_with(OUTPUT_PREFIX) => Some(key.as_str()),
            _ => None,
        }
    }

    /// Computed value or message expression, if any
    pub fn expression(&self) -> Option<&str> {
        match self {
            Action::SetValue {
                value_expression, ..
            } => value_expression.as_deref(),
            Action::SendMessage {
                message_expression, ..
            } => message_expression.as_deref(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_parse() {
        assert_eq!(CompareOp::parse(">="), Some(CompareOp::Gte));
        assert_eq!(CompareOp::parse("="), Some(CompareOp::Eq));
        assert_eq!(CompareOp::parse(" != "), Some(CompareOp::Ne));
        assert_eq!(CompareOp::parse("~="), None);
        assert!(CompareOp::Lte.holds(3.0, 3.0));
        assert!(!CompareOp::Gt.holds(3.0, 3.0));
    }

    #[test]
    fn test_condition_tagged_yaml() {
        let yaml = r#"
type: group
all:
  - type: comparison
    sensor: input:temperature
    operator: ">"
    value: 30
  - type: threshold_over_time
    sensor: input:pressure
    threshold: 1000
    duration_ms: 1500
any:
  - type: expression
    expression: "input:a + input:b > 10"
"#;
        let condition: Condition = serde_yaml::from_str(yaml).unwrap();
        let Condition::Group(group) = condition else {
            panic!("expected group");
        };
        assert_eq!(group.all.len(), 2);
        assert_eq!(group.children().count(), 3);
        match &group.all[1] {
            Condition::ThresholdOverTime(t) => {
                assert_eq!(t.operator, ">");
                assert_eq!(t.duration_ms, 1500);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_output_keys() {
        let rule = RuleDefinition {
            name: "r".to_string(),
            description: None,
            source_file: None,
            conditions: ConditionGroup::default(),
            actions: vec![
                Action::set_value("output:alarm", true),
                Action::set_value("state:mode", "auto"),
                Action::SendMessage {
                    channel: "alerts".to_string(),
                    message: Some("hi".to_string()),
                    message_expression: None,
                },
            ],
        };
        assert_eq!(rule.output_keys().collect::<Vec<_>>(), vec!["output:alarm"]);
    }
}
