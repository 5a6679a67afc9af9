//! Synthetic sensor values
//!
//! Picks a concrete value that satisfies (positive) or violates (negative) a
//! comparison. Numeric values keep a margin from the threshold so a test never
//! sits on the boundary:
//!
//! | operator   | positive        | negative        |
//! |------------|-----------------|-----------------|
//! | `>` `>=`   | above           | below           |
//! | `<` `<=`   | below           | above           |
//! | `==` `=`   | threshold       | threshold + m   |
//! | `!=`       | threshold + m   | threshold       |
//!
//! `above` is the top of the 0.5×/1.5× band when that lies past the threshold,
//! otherwise `threshold + m`; `below` mirrors it. `m = max(|threshold| / 2, 1)`.
//!
//! Temporal sequences start at the instantaneous value and ramp away from the
//! threshold by `m × step / total`, so every sample keeps its polarity.
//! Equality operators hold the value constant.

use serde::{Deserialize, Serialize};
use tracing::warn;
use voltage_calc::{parse_bool_keyword, parse_number_lenient, Scalar};
use voltage_rules::{CompareOp, ComparisonCondition, ConditionGroup, ThresholdOverTimeCondition};

use crate::condition_analyzer::{
    comparison_number, find_sensor_condition, numeric_boundaries, SensorCondition,
};
use crate::config::GeneratorConfig;

/// Whether a generated value should satisfy or violate its condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn flipped(self) -> Self {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        }
    }
}

/// Value generator with configured neutral defaults
#[derive(Debug, Clone)]
pub struct ValueGenerator {
    neutral_positive: f64,
    neutral_negative: f64,
}

impl Default for ValueGenerator {
    fn default() -> Self {
        Self::new(&GeneratorConfig::default())
    }
}

/// Distance kept from a threshold
pub fn margin(threshold: f64) -> f64 {
    (threshold.abs() * 0.5).max(1.0)
}

/// Literal of a comparison, classified
enum Literal {
    Bool(bool),
    Number(f64),
    Text(String),
}

fn classify(value: &Scalar) -> Literal {
    match value {
        Scalar::Bool(b) => Literal::Bool(*b),
        Scalar::Number(n) => Literal::Number(*n),
        Scalar::Text(s) => {
            if let Some(b) = parse_bool_keyword(s) {
                Literal::Bool(b)
            } else if let Some(n) = parse_number_lenient(s) {
                Literal::Number(n)
            } else {
                Literal::Text(s.clone())
            }
        },
    }
}

impl ValueGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            neutral_positive: config.neutral_positive,
            neutral_negative: config.neutral_negative,
        }
    }

    /// Value for a sensor no condition constrains
    pub fn neutral(&self, target: Polarity) -> Scalar {
        match target {
            Polarity::Positive => Scalar::Number(self.neutral_positive),
            Polarity::Negative => Scalar::Number(self.neutral_negative),
        }
    }

    /// Value satisfying or violating a single comparison
    pub fn value_for_condition(&self, comparison: &ComparisonCondition, target: Polarity) -> Scalar {
        let Some(op) = comparison.op() else {
            warn!(
                sensor = %comparison.sensor,
                operator = %comparison.operator,
                "Unknown operator, using neutral value"
            );
            return self.neutral(target);
        };

        match classify(&comparison.value) {
            Literal::Bool(b) => Scalar::Bool(bool_value(op, b, target)),
            Literal::Number(_) => Scalar::Number(numeric_value(comparison, op, target)),
            Literal::Text(text) => match op {
                CompareOp::Eq | CompareOp::Ne => {
                    let satisfy = (op == CompareOp::Eq) == (target == Polarity::Positive);
                    if satisfy {
                        Scalar::Text(text)
                    } else {
                        Scalar::Text(format!("not_{}", text))
                    }
                },
                _ => {
                    warn!(
                        sensor = %comparison.sensor,
                        operator = %op,
                        value = %text,
                        "Ordering comparison against text, using neutral value"
                    );
                    self.neutral(target)
                },
            },
        }
    }

    /// Value at `step` of `total` for a threshold-over-time condition
    pub fn value_for_temporal(
        &self,
        temporal: &ThresholdOverTimeCondition,
        step: u64,
        total: u64,
        target: Polarity,
    ) -> Scalar {
        let comparison = temporal.as_comparison();
        let base = self.value_for_condition(&comparison, target);

        let (Scalar::Number(start), Some(op)) = (&base, comparison.op()) else {
            return base;
        };
        if matches!(op, CompareOp::Eq | CompareOp::Ne) {
            return base;
        }

        let direction = if *start >= temporal.threshold { 1.0 } else { -1.0 };
        let fraction = step as f64 / total.max(1) as f64;
        Scalar::Number(start + direction * margin(temporal.threshold) * fraction)
    }

    /// Value for `sensor` derived from whichever leaf of `group` constrains it
    ///
    /// Falls back to the neutral value (logged) when nothing references the sensor.
    pub fn value_for_sensor(&self, group: &ConditionGroup, sensor: &str, target: Polarity) -> Scalar {
        self.derive_for_sensor(group, sensor, target)
            .unwrap_or_else(|| {
                warn!(sensor, ?target, "No condition constrains sensor, using neutral value");
                self.neutral(target)
            })
    }

    /// Like [`Self::value_for_sensor`] without the fallback
    pub fn derive_for_sensor(
        &self,
        group: &ConditionGroup,
        sensor: &str,
        target: Polarity,
    ) -> Option<Scalar> {
        match find_sensor_condition(group, sensor)? {
            SensorCondition::Comparison(c) => Some(self.value_for_condition(c, target)),
            SensorCondition::Temporal(t) => {
                Some(self.value_for_condition(&t.as_comparison(), target))
            },
        }
    }
}

fn bool_value(op: CompareOp, literal: bool, target: Polarity) -> bool {
    let satisfying = match op {
        CompareOp::Ne => !literal,
        // Ordering against a boolean: treat as equality
        _ => literal,
    };
    match target {
        Polarity::Positive => satisfying,
        Polarity::Negative => !satisfying,
    }
}

fn numeric_value(comparison: &ComparisonCondition, op: CompareOp, target: Polarity) -> f64 {
    let threshold = comparison_number(&comparison.value);
    let m = margin(threshold);
    let (low, high) = numeric_boundaries(comparison);
    let above = if high > threshold { high } else { threshold + m };
    let below = if low < threshold { low } else { threshold - m };

    match (op, target) {
        (CompareOp::Gt | CompareOp::Gte, Polarity::Positive) => above,
        (CompareOp::Gt | CompareOp::Gte, Polarity::Negative) => below,
        (CompareOp::Lt | CompareOp::Lte, Polarity::Positive) => below,
        (CompareOp::Lt | CompareOp::Lte, Polarity::Negative) => above,
        (CompareOp::Eq, Polarity::Positive) | (CompareOp::Ne, Polarity::Negative) => threshold,
        (CompareOp::Eq, Polarity::Negative) | (CompareOp::Ne, Polarity::Positive) => {
            threshold + m
        },
    }
}
