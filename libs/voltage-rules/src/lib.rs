//! Voltage Rules - Rule Definition Model
//!
//! Declarative rule definitions consumed by the rule test harness:
//! - Condition trees (comparison, expression, threshold-over-time, all/any groups)
//! - Actions (set value, send message)
//! - Rule-file loading from YAML or JSON with validation

mod error;
mod parser;
pub mod types;

// Re-export public API
pub use error::{Result, RuleError};
pub use parser::{load_rules_from_file, parse_rules_str, validate_rules};

// Re-export rule types for convenience
pub use types::{
    Action, CompareOp, ComparisonCondition, Condition, ConditionGroup, ExpressionCondition,
    RuleDefinition, ThresholdOverTimeCondition, DOMAIN_PREFIXES, INPUT_PREFIX, OUTPUT_PREFIX,
};
