//! Simulated rule engine for end-to-end tests
//!
//! Each cycle takes one snapshot of the string keys in a `MemoryRtdb`,
//! evaluates every rule against it and writes the set-value actions of the
//! rules that hold. Outputs latch: nothing is written when a rule does not hold.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use voltage_calc::{ExpressionEngine, Scalar};
use voltage_rtdb::{MemoryRtdb, Rtdb};
use voltage_rules::{
    Action, CompareOp, ComparisonCondition, Condition, ConditionGroup, RuleDefinition,
    ThresholdOverTimeCondition,
};

pub const ENGINE_CYCLE: Duration = Duration::from_millis(20);

/// Running engine task, stopped on drop
pub struct SimulatedEngine {
    handle: JoinHandle<()>,
}

impl SimulatedEngine {
    pub fn spawn(rtdb: Arc<MemoryRtdb>, rules: Vec<RuleDefinition>) -> Self {
        let handle = tokio::spawn(async move {
            let mut engine = Engine {
                expressions: ExpressionEngine::new(),
                held_since: HashMap::new(),
            };
            let mut ticker = tokio::time::interval(ENGINE_CYCLE);
            loop {
                ticker.tick().await;
                let snapshot = snapshot(&rtdb).await;
                let writes = engine.cycle(&rules, &snapshot);
                for (key, value) in writes {
                    let _ = rtdb.set_string(&key, &value.to_store_string()).await;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Snapshot = HashMap<String, Option<Scalar>>;

async fn snapshot(rtdb: &MemoryRtdb) -> Snapshot {
    let mut values = HashMap::new();
    for key in rtdb.scan_match("*").await.unwrap_or_default() {
        if let Ok(Some(text)) = rtdb.get_string(&key).await {
            values.insert(key, Some(Scalar::from_text_coerced(&text)));
        }
    }
    values
}

struct Engine {
    expressions: ExpressionEngine,
    /// (rule, sensor) → when the temporal comparison started holding
    held_since: HashMap<(String, String), Instant>,
}

impl Engine {
    fn cycle(&mut self, rules: &[RuleDefinition], snapshot: &Snapshot) -> Vec<(String, Scalar)> {
        let mut writes = Vec::new();
        for rule in rules {
            if !self.group_holds(&rule.name, &rule.conditions, snapshot) {
                continue;
            }

            let mut bindings = snapshot.clone();
            for action in &rule.actions {
                let Action::SetValue {
                    key,
                    value,
                    value_expression,
                } = action
                else {
                    continue;
                };
                let computed = match (value, value_expression) {
                    (Some(value), _) => Some(value.clone()),
                    (None, Some(expression)) => self
                        .expressions
                        .evaluate(expression, &bindings)
                        .ok()
                        .flatten(),
                    (None, None) => None,
                };
                if let Some(value) = computed {
                    bindings.insert(key.clone(), Some(value.clone()));
                    writes.push((key.clone(), value));
                }
            }
        }
        writes
    }

    fn group_holds(&mut self, rule: &str, group: &ConditionGroup, snapshot: &Snapshot) -> bool {
        // Evaluate every child so temporal state is tracked on each cycle
        let all: Vec<bool> = group
            .all
            .iter()
            .map(|c| self.condition_holds(rule, c, snapshot))
            .collect();
        let any: Vec<bool> = group
            .any
            .iter()
            .map(|c| self.condition_holds(rule, c, snapshot))
            .collect();
        all.iter().all(|held| *held) && (any.is_empty() || any.iter().any(|held| *held))
    }

    fn condition_holds(&mut self, rule: &str, condition: &Condition, snapshot: &Snapshot) -> bool {
        match condition {
            Condition::Comparison(c) => compare(c, snapshot.get(&c.sensor).and_then(Option::as_ref)),
            Condition::Expression(e) => matches!(
                self.expressions.evaluate(&e.expression, snapshot),
                Ok(Some(Scalar::Bool(true)))
            ),
            Condition::ThresholdOverTime(t) => self.temporal_holds(rule, t, snapshot),
            Condition::Group(g) => self.group_holds(rule, g, snapshot),
        }
    }

    fn temporal_holds(
        &mut self,
        rule: &str,
        temporal: &ThresholdOverTimeCondition,
        snapshot: &Snapshot,
    ) -> bool {
        let state_key = (rule.to_string(), temporal.sensor.clone());
        let actual = snapshot.get(&temporal.sensor).and_then(Option::as_ref);

        if !compare(&temporal.as_comparison(), actual) {
            self.held_since.remove(&state_key);
            return false;
        }
        let since = *self.held_since.entry(state_key).or_insert_with(Instant::now);
        since.elapsed() >= Duration::from_millis(temporal.duration_ms)
    }
}

fn compare(condition: &ComparisonCondition, actual: Option<&Scalar>) -> bool {
    let (Some(op), Some(actual)) = (condition.op(), actual) else {
        return false;
    };

    match condition.value.clone().coerced() {
        Scalar::Bool(expected) => match actual.as_bool() {
            Some(a) if op == CompareOp::Ne => a != expected,
            Some(a) => a == expected,
            None => false,
        },
        Scalar::Number(threshold) => actual
            .as_f64()
            .is_some_and(|value| op.holds(value, threshold)),
        Scalar::Text(expected) => {
            let equal = actual.to_store_string().eq_ignore_ascii_case(&expected);
            match op {
                CompareOp::Eq => equal,
                CompareOp::Ne => !equal,
                _ => false,
            }
        },
    }
}
