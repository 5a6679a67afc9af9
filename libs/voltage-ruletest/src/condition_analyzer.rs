//! Condition tree analysis
//!
//! Pure functions over rule condition trees: sensor extraction, temporal
//! detection and the numeric band a comparison draws its test values from.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use voltage_calc::Scalar;
use voltage_rules::{
    CompareOp, ComparisonCondition, Condition, ConditionGroup, ThresholdOverTimeCondition,
};

/// Store key references inside free-form expressions
#[allow(clippy::expect_used)]
static SENSOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:input|output|buffer):[A-Za-z0-9_]+").expect("valid sensor regex")
});

/// Band used for an unrecognised operator
const FALLBACK_BAND: (f64, f64) = (0.0, 100.0);

/// Leaf condition that constrains a single sensor
#[derive(Debug, Clone, Copy)]
pub enum SensorCondition<'a> {
    Comparison(&'a ComparisonCondition),
    Temporal(&'a ThresholdOverTimeCondition),
}

/// Keys referenced by an expression string
pub fn sensors_in_expression(expression: &str) -> BTreeSet<String> {
    SENSOR_PATTERN
        .find_iter(expression)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// All sensor keys referenced anywhere below `condition`
pub fn extract_sensors(condition: &Condition) -> BTreeSet<String> {
    let mut sensors = BTreeSet::new();
    collect_sensors(condition, &mut sensors);
    sensors
}

/// All sensor keys referenced by a group's children
pub fn extract_group_sensors(group: &ConditionGroup) -> BTreeSet<String> {
    let mut sensors = BTreeSet::new();
    for child in group.children() {
        collect_sensors(child, &mut sensors);
    }
    sensors
}

fn collect_sensors(condition: &Condition, sensors: &mut BTreeSet<String>) {
    match condition {
        Condition::Comparison(c) => {
            if !c.sensor.is_empty() {
                sensors.insert(c.sensor.clone());
            }
            if let Some(expression) = &c.expression {
                sensors.extend(sensors_in_expression(expression));
            }
        },
        Condition::Expression(e) => sensors.extend(sensors_in_expression(&e.expression)),
        Condition::ThresholdOverTime(t) => {
            if !t.sensor.is_empty() {
                sensors.insert(t.sensor.clone());
            }
        },
        Condition::Group(g) => {
            for child in g.children() {
                collect_sensors(child, sensors);
            }
        },
    }
}

/// Whether any reachable node is a threshold-over-time condition
pub fn has_temporal_condition(condition: &Condition) -> bool {
    match condition {
        Condition::ThresholdOverTime(_) => true,
        Condition::Group(g) => group_has_temporal_condition(g),
        Condition::Comparison(_) | Condition::Expression(_) => false,
    }
}

pub fn group_has_temporal_condition(group: &ConditionGroup) -> bool {
    group.children().any(has_temporal_condition)
}

/// Threshold-over-time conditions in tree order
pub fn temporal_conditions(group: &ConditionGroup) -> Vec<&ThresholdOverTimeCondition> {
    fn walk<'a>(condition: &'a Condition, out: &mut Vec<&'a ThresholdOverTimeCondition>) {
        match condition {
            Condition::ThresholdOverTime(t) => out.push(t),
            Condition::Group(g) => g.children().for_each(|c| walk(c, out)),
            Condition::Comparison(_) | Condition::Expression(_) => {},
        }
    }

    let mut out = Vec::new();
    group.children().for_each(|c| walk(c, &mut out));
    out
}

/// First comparison or temporal leaf whose sensor is `sensor`
pub fn find_sensor_condition<'a>(
    group: &'a ConditionGroup,
    sensor: &str,
) -> Option<SensorCondition<'a>> {
    fn walk<'a>(condition: &'a Condition, sensor: &str) -> Option<SensorCondition<'a>> {
        match condition {
            Condition::Comparison(c) if c.sensor == sensor => Some(SensorCondition::Comparison(c)),
            Condition::ThresholdOverTime(t) if t.sensor == sensor => {
                Some(SensorCondition::Temporal(t))
            },
            Condition::Group(g) => g.children().find_map(|c| walk(c, sensor)),
            _ => None,
        }
    }

    group.children().find_map(|c| walk(c, sensor))
}

/// Numeric view of a comparison's literal; unparsable text counts as 0
pub fn comparison_number(value: &Scalar) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

/// Range around a comparison's threshold from which test values are drawn
///
/// Ordering operators and `!=` give `(0.5 × value, 1.5 × value)`, equality the
/// exact point, and unknown operators `(0, 100)`.
pub fn numeric_boundaries(comparison: &ComparisonCondition) -> (f64, f64) {
    let value = comparison_number(&comparison.value);
    match comparison.op() {
        Some(CompareOp::Eq) => (value, value),
        Some(_) => (value * 0.5, value * 1.5),
        None => FALLBACK_BAND,
    }
}
