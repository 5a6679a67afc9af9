//! Rule set analysis
//!
//! Aggregates per-rule sensor sets, finds which rules feed which through
//! `output:` keys, and classifies temporal rules.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use voltage_rules::{Action, RuleDefinition, INPUT_PREFIX};

use crate::condition_analyzer::{
    extract_group_sensors, group_has_temporal_condition, sensors_in_expression,
};

/// Where a target rule reads the shared key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Referenced by the target's condition tree
    Condition,
    /// Referenced only by one of the target's action expressions
    ActionExpression,
}

/// `target_rule` reads `key`, which `source_rule` writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub source_rule: String,
    pub target_rule: String,
    pub key: String,
    pub dependency_type: DependencyType,
}

/// Result of one analysis pass over a rule set
#[derive(Debug, Clone, Default)]
pub struct RuleAnalysis {
    /// Union of every `input:` key referenced by any rule's conditions
    pub input_sensors: BTreeSet<String>,
    pub dependencies: Vec<Dependency>,
    pub temporal_rules: Vec<RuleDefinition>,
    pub rules: Vec<RuleDefinition>,
    /// Condition sensors of each rule, keyed by rule name
    pub sensors_by_rule: BTreeMap<String, BTreeSet<String>>,
}

impl RuleAnalysis {
    pub fn rule(&self, name: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Dependencies grouped by target rule name
    pub fn dependencies_by_target(&self) -> BTreeMap<&str, Vec<&Dependency>> {
        let mut grouped: BTreeMap<&str, Vec<&Dependency>> = BTreeMap::new();
        for dependency in &self.dependencies {
            grouped
                .entry(dependency.target_rule.as_str())
                .or_default()
                .push(dependency);
        }
        grouped
    }

    /// Rules other than `exclude` whose conditions reference `sensor`, in rule order
    pub fn rules_referencing<'a>(
        &'a self,
        sensor: &'a str,
        exclude: &'a str,
    ) -> impl Iterator<Item = &'a RuleDefinition> + 'a {
        self.rules.iter().filter(move |rule| {
            rule.name != exclude
                && self
                    .sensors_by_rule
                    .get(&rule.name)
                    .is_some_and(|sensors| sensors.contains(sensor))
        })
    }

    pub fn is_temporal(&self, rule: &str) -> bool {
        self.temporal_rules.iter().any(|r| r.name == rule)
    }
}

/// Analyze a rule set
pub fn analyze_rules(rules: &[RuleDefinition]) -> RuleAnalysis {
    let sensors_by_rule: BTreeMap<String, BTreeSet<String>> = rules
        .iter()
        .map(|rule| (rule.name.clone(), extract_group_sensors(&rule.conditions)))
        .collect();

    let input_sensors: BTreeSet<String> = sensors_by_rule
        .values()
        .flatten()
        .filter(|sensor| sensor.starts_with(INPUT_PREFIX))
        .cloned()
        .collect();

    let temporal_rules: Vec<RuleDefinition> = rules
        .iter()
        .filter(|rule| group_has_temporal_condition(&rule.conditions))
        .cloned()
        .collect();

    let dependencies = find_dependencies(rules, &sensors_by_rule);

    debug!(
        rules = rules.len(),
        inputs = input_sensors.len(),
        dependencies = dependencies.len(),
        temporal = temporal_rules.len(),
        "Rule analysis complete"
    );

    RuleAnalysis {
        input_sensors,
        dependencies,
        temporal_rules,
        rules: rules.to_vec(),
        sensors_by_rule,
    }
}

fn action_expression_keys(rule: &RuleDefinition) -> BTreeSet<String> {
    rule.actions
        .iter()
        .filter(|action| matches!(action, Action::SetValue { .. }))
        .filter_map(Action::expression)
        .flat_map(sensors_in_expression)
        .collect()
}

fn find_dependencies(
    rules: &[RuleDefinition],
    sensors_by_rule: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<Dependency> {
    let mut dependencies = Vec::new();

    for target in rules {
        let condition_keys = sensors_by_rule.get(&target.name);
        let expression_keys = action_expression_keys(target);

        for source in rules.iter().filter(|r| r.name != target.name) {
            let written: BTreeSet<&str> = source.output_keys().collect();
            for key in written {
                let dependency_type = if condition_keys.is_some_and(|keys| keys.contains(key)) {
                    DependencyType::Condition
                } else if expression_keys.contains(key) {
                    DependencyType::ActionExpression
                } else {
                    continue;
                };

                dependencies.push(Dependency {
                    source_rule: source.name.clone(),
                    target_rule: target.name.clone(),
                    key: key.to_string(),
                    dependency_type,
                });
            }
        }
    }

    dependencies
}
