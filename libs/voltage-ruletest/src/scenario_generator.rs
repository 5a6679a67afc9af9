//! Scenario generation
//!
//! Turns an analyzed rule set into runnable scenarios:
//!
//! - `{rule}_positive` / `{rule}_negative`: one trigger step with a complete
//!   input vector (the rule's own sensors plus every global `input:` sensor);
//!   temporal rules wait out their hold time before the check
//! - `{rule}_dependency` / `{rule}_missing_dependency`: upstream outputs are
//!   simulated through pre-set values instead of running the upstream rule
//! - `{rule}_temporal`: an input sequence that keeps a threshold-over-time
//!   condition satisfied for its whole duration
//!
//! Every scenario clears `output:*` and primes the rule's outputs with values
//! opposite to what a firing rule writes, so a pass means the rule actually
//! wrote the value.
//!
//! One rule failing to generate never blocks the rest: the failing unit is
//! logged and left out of the batch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, warn};
use voltage_calc::{parse_bool_keyword, ExpressionEngine, Scalar};
use voltage_rules::{Action, Condition, RuleDefinition, OUTPUT_PREFIX};

use crate::condition_analyzer::temporal_conditions;
use crate::config::GeneratorConfig;
use crate::error::{HarnessError, Result};
use crate::rule_analyzer::{Dependency, RuleAnalysis};
use crate::scenario::{SequenceStep, TestCase, TestExpectation, TestInput, TestScenario, TestStep};
use crate::value_generator::{Polarity, ValueGenerator};

/// Key-name fragments that mark a dependency output as a boolean flag
///
/// Only consulted when neither the downstream condition nor the upstream
/// action pins a value.
pub const FLAG_KEY_HINTS: [&str; 4] = ["enabled", "alarm", "detected", "active"];

/// Pre-set text for a missing text dependency
pub const MISSING_DEPENDENCY_TEXT: &str = "missing_dependency";

/// Pre-set text replacing an empty expected string
pub const PRETEST_TEXT: &str = "pretest";

/// Value primed before a test so that only a firing rule produces `expected`
pub fn opposite_value(expected: &Scalar) -> Scalar {
    match expected {
        Scalar::Bool(b) => Scalar::Bool(!b),
        Scalar::Number(n) if *n != 0.0 => Scalar::Number(0.0),
        Scalar::Number(_) => Scalar::Number(1.0),
        Scalar::Text(s) if s.is_empty() => Scalar::Text(PRETEST_TEXT.to_string()),
        Scalar::Text(_) => Scalar::Text(String::new()),
    }
}

/// Expectations for a rule that did not fire: booleans negate, the rest is unknown
fn negated_outputs(outputs: &BTreeMap<String, Option<Scalar>>) -> BTreeMap<String, Option<Scalar>> {
    outputs
        .iter()
        .map(|(key, value)| {
            let negated = match value {
                Some(Scalar::Bool(b)) => Some(Scalar::Bool(!b)),
                _ => None,
            };
            (key.clone(), negated)
        })
        .collect()
}

/// Opposite pre-set values for the predictable `output:` expectations
fn pre_set_for(outputs: &BTreeMap<String, Option<Scalar>>) -> BTreeMap<String, Scalar> {
    outputs
        .iter()
        .filter(|(key, _)| key.starts_with(OUTPUT_PREFIX))
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.clone(), opposite_value(v))))
        .collect()
}

fn bindings_from(inputs: &BTreeMap<String, Scalar>) -> HashMap<String, Option<Scalar>> {
    inputs
        .iter()
        .map(|(key, value)| (key.clone(), Some(value.clone())))
        .collect()
}

/// Reject leaves that name no sensor
fn check_conditions(rule: &RuleDefinition) -> Result<()> {
    fn walk(rule: &str, condition: &Condition) -> Result<()> {
        match condition {
            Condition::Comparison(c) if c.sensor.is_empty() && c.expression.is_none() => Err(
                HarnessError::generation(rule, "comparison condition without a sensor"),
            ),
            Condition::ThresholdOverTime(t) if t.sensor.is_empty() => Err(
                HarnessError::generation(rule, "threshold-over-time condition without a sensor"),
            ),
            Condition::Group(g) => g.children().try_for_each(|c| walk(rule, c)),
            _ => Ok(()),
        }
    }

    rule.conditions
        .children()
        .try_for_each(|c| walk(&rule.name, c))
}

/// Builds scenarios from a rule analysis
pub struct ScenarioGenerator {
    config: GeneratorConfig,
    values: ValueGenerator,
    engine: ExpressionEngine,
}

impl Default for ScenarioGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

impl ScenarioGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            values: ValueGenerator::new(&config),
            config,
            engine: ExpressionEngine::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    // ========================================================================
    // Batch
    // ========================================================================

    /// Generate every scenario for the analyzed rule set
    pub fn generate_all(&self, analysis: &RuleAnalysis) -> Vec<TestScenario> {
        let mut scenarios = Vec::new();
        let mut failed = 0usize;

        for rule in &analysis.rules {
            match self.generate_basic_scenarios(rule, analysis) {
                Ok(mut basic) => scenarios.append(&mut basic),
                Err(e) => {
                    failed += 1;
                    error!(rule = %rule.name, "Basic scenario generation failed: {}", e);
                },
            }
        }

        for (target, dependencies) in analysis.dependencies_by_target() {
            let Some(rule) = analysis.rule(target) else {
                continue;
            };
            match self.generate_dependency_scenarios(rule, &dependencies, analysis) {
                Ok(mut dependency) => scenarios.append(&mut dependency),
                Err(e) => {
                    failed += 1;
                    error!(rule = %target, "Dependency scenario generation failed: {}", e);
                },
            }
        }

        for rule in &analysis.temporal_rules {
            match self.generate_temporal_scenarios(rule, analysis) {
                Ok(mut temporal) => scenarios.append(&mut temporal),
                Err(e) => {
                    failed += 1;
                    error!(rule = %rule.name, "Temporal scenario generation failed: {}", e);
                },
            }
        }

        info!(
            scenarios = scenarios.len(),
            failed,
            "Generated {} scenarios from {} rules",
            scenarios.len(),
            analysis.rules.len()
        );
        scenarios
    }

    // ========================================================================
    // Inputs and outputs
    // ========================================================================

    /// Complete input vector for `rule`
    ///
    /// The rule's own condition sensors (minus the keys it writes itself) get
    /// `own` polarity. Every other global `input:` sensor is backfilled with
    /// `backfill` polarity from the first other rule that constrains it, or
    /// the neutral value.
    fn build_inputs(
        &self,
        rule: &RuleDefinition,
        analysis: &RuleAnalysis,
        own: Polarity,
        backfill: Polarity,
    ) -> Result<BTreeMap<String, Scalar>> {
        check_conditions(rule)?;

        let written: BTreeSet<&str> = rule.output_keys().collect();
        let mut inputs = BTreeMap::new();

        if let Some(sensors) = analysis.sensors_by_rule.get(&rule.name) {
            for sensor in sensors.iter().filter(|s| !written.contains(s.as_str())) {
                let value = self.values.value_for_sensor(&rule.conditions, sensor, own);
                inputs.insert(sensor.clone(), value);
            }
        }

        for sensor in &analysis.input_sensors {
            if inputs.contains_key(sensor) {
                continue;
            }
            let value = analysis
                .rules_referencing(sensor, &rule.name)
                .find_map(|other| self.values.derive_for_sensor(&other.conditions, sensor, backfill))
                .unwrap_or_else(|| {
                    debug!(rule = %rule.name, sensor = %sensor, "Backfilling neutral value");
                    self.values.neutral(backfill)
                });
            inputs.insert(sensor.clone(), value);
        }

        Ok(inputs)
    }

    /// Inputs and predicted outputs for one polarity of a rule
    pub fn generate_test_case(
        &self,
        rule: &RuleDefinition,
        analysis: &RuleAnalysis,
        polarity: Polarity,
    ) -> Result<TestCase> {
        let inputs = self.build_inputs(rule, analysis, polarity, polarity)?;
        let outputs = match polarity {
            Polarity::Positive => self.expected_outputs(rule, &bindings_from(&inputs)),
            Polarity::Negative => {
                // Negation of the outputs written when the rule fires
                let firing = self.build_inputs(rule, analysis, Polarity::Positive, Polarity::Positive)?;
                negated_outputs(&self.expected_outputs(rule, &bindings_from(&firing)))
            },
        };
        Ok(TestCase { inputs, outputs })
    }

    /// Values the rule's set-value actions write when it fires
    ///
    /// Later actions see the outputs of earlier ones. `None` marks an output
    /// that cannot be predicted.
    pub fn expected_outputs(
        &self,
        rule: &RuleDefinition,
        bindings: &HashMap<String, Option<Scalar>>,
    ) -> BTreeMap<String, Option<Scalar>> {
        let mut bindings = bindings.clone();
        let mut outputs = BTreeMap::new();

        for action in &rule.actions {
            let Action::SetValue {
                key,
                value,
                value_expression,
            } = action
            else {
                continue;
            };

            let predicted = match (value, value_expression) {
                (Some(value), _) => Some(value.clone().coerced()),
                (None, Some(expression)) => self.evaluate_output(rule, key, expression, &bindings),
                (None, None) => None,
            };

            bindings.insert(key.clone(), predicted.clone());
            outputs.insert(key.clone(), predicted);
        }

        outputs
    }

    fn evaluate_output(
        &self,
        rule: &RuleDefinition,
        key: &str,
        expression: &str,
        bindings: &HashMap<String, Option<Scalar>>,
    ) -> Option<Scalar> {
        match self.engine.evaluate(expression, bindings) {
            Ok(value) => value,
            Err(e) => {
                debug!(rule = %rule.name, key, expression, "Evaluation failed, trying fallbacks: {}", e);
                let fallback = expression_fallback(expression, bindings);
                if fallback.is_none() {
                    warn!(rule = %rule.name, key, expression, "Cannot predict output value");
                }
                fallback
            },
        }
    }

    // ========================================================================
    // Basic scenarios
    // ========================================================================

    /// `{rule}_positive` and `{rule}_negative`
    pub fn generate_basic_scenarios(
        &self,
        rule: &RuleDefinition,
        analysis: &RuleAnalysis,
    ) -> Result<Vec<TestScenario>> {
        let positive = self.generate_test_case(rule, analysis, Polarity::Positive)?;
        let negative = self.generate_test_case(rule, analysis, Polarity::Negative)?;
        let pre_set = pre_set_for(&positive.outputs);

        let mut scenarios = Vec::with_capacity(2);
        for (polarity, case) in [(Polarity::Positive, positive), (Polarity::Negative, negative)] {
            let (suffix, description) = match polarity {
                Polarity::Positive => ("positive", "conditions satisfied, rule fires"),
                Polarity::Negative => ("negative", "conditions violated, rule does not fire"),
            };
            let mut scenario = TestScenario::new(
                format!("{}_{}", rule.name, suffix),
                format!("{}: {}", rule.name, description),
            );
            scenario.clear_outputs = true;
            scenario.pre_set_outputs = pre_set.clone();
            scenario
                .steps
                .push(self.trigger_step(rule, &case.inputs, &case.outputs, &[]));
            scenarios.push(scenario);
        }

        debug!(rule = %rule.name, "Generated basic scenarios");
        Ok(scenarios)
    }

    /// Processing delay, plus the longest hold time of a temporal rule
    fn trigger_delay(&self, rule: &RuleDefinition) -> u64 {
        let hold = temporal_conditions(&rule.conditions)
            .iter()
            .map(|t| t.duration_ms)
            .max()
            .unwrap_or_default();
        self.config.processing_delay_ms.saturating_add(hold)
    }

    fn trigger_step(
        &self,
        rule: &RuleDefinition,
        inputs: &BTreeMap<String, Scalar>,
        outputs: &BTreeMap<String, Option<Scalar>>,
        skip_inputs: &[&str],
    ) -> TestStep {
        TestStep {
            name: "trigger".to_string(),
            description: "Write inputs and check outputs".to_string(),
            inputs: inputs
                .iter()
                .filter(|(key, _)| !skip_inputs.contains(&key.as_str()))
                .map(|(key, value)| TestInput::new(key.clone(), value.clone()))
                .collect(),
            delay_ms: self.trigger_delay(rule),
            expectations: outputs
                .iter()
                .filter_map(|(key, value)| value.as_ref().map(|v| self.expectation(key, v)))
                .collect(),
        }
    }

    fn expectation(&self, key: &str, value: &Scalar) -> TestExpectation {
        let mut expectation = TestExpectation::new(key, value.clone());
        if value.is_number() {
            expectation.tolerance = Some(self.config.default_tolerance);
        }
        expectation
    }

    // ========================================================================
    // Dependency scenarios
    // ========================================================================

    /// `{target}_dependency` and `{target}_missing_dependency`
    ///
    /// Upstream rules are held quiet (backfill uses negative polarity) so the
    /// pre-set dependency values are the only source of the shared keys.
    pub fn generate_dependency_scenarios(
        &self,
        target: &RuleDefinition,
        dependencies: &[&Dependency],
        analysis: &RuleAnalysis,
    ) -> Result<Vec<TestScenario>> {
        if dependencies.is_empty() {
            return Ok(Vec::new());
        }

        let mut dependency_values: BTreeMap<String, DependencyValue> = BTreeMap::new();
        for dependency in dependencies {
            if dependency_values.contains_key(&dependency.key) {
                continue;
            }
            let value = self.dependency_value(target, dependency, analysis);
            dependency_values.insert(dependency.key.clone(), value);
        }
        let keys: Vec<&str> = dependency_values.keys().map(String::as_str).collect();

        let inputs = self.build_inputs(target, analysis, Polarity::Positive, Polarity::Negative)?;

        // Outputs are predicted with the simulated dependency values in scope
        let mut bindings = bindings_from(&inputs);
        for (key, value) in &dependency_values {
            bindings.insert(key.clone(), Some(value.value.clone()));
        }
        let outputs = self.expected_outputs(target, &bindings);
        let output_pre_set = pre_set_for(&outputs);

        let mut present = TestScenario::new(
            format!("{}_dependency", target.name),
            format!(
                "{}: upstream outputs {} present",
                target.name,
                keys.join(", ")
            ),
        );
        present.clear_outputs = true;
        present.pre_set_outputs = output_pre_set.clone();
        for (key, value) in &dependency_values {
            present.pre_set_outputs.insert(key.clone(), value.value.clone());
        }
        present
            .steps
            .push(self.trigger_step(target, &inputs, &outputs, &keys));

        let mut missing = TestScenario::new(
            format!("{}_missing_dependency", target.name),
            format!(
                "{}: upstream outputs {} missing",
                target.name,
                keys.join(", ")
            ),
        );
        missing.clear_outputs = true;
        missing.pre_set_outputs = output_pre_set;
        for (key, value) in &dependency_values {
            missing
                .pre_set_outputs
                .insert(key.clone(), self.missing_value(target, key, value));
        }
        missing.steps.push(self.trigger_step(
            target,
            &inputs,
            &negated_outputs(&outputs),
            &keys,
        ));

        debug!(rule = %target.name, dependencies = keys.len(), "Generated dependency scenarios");
        Ok(vec![present, missing])
    }

    /// Simulated upstream value: derived from the target's condition, else the
    /// source's static action value, else a name-based default
    fn dependency_value(
        &self,
        target: &RuleDefinition,
        dependency: &Dependency,
        analysis: &RuleAnalysis,
    ) -> DependencyValue {
        if let Some(value) =
            self.values
                .derive_for_sensor(&target.conditions, &dependency.key, Polarity::Positive)
        {
            return DependencyValue {
                value,
                from_condition: true,
            };
        }

        let static_value = analysis.rule(&dependency.source_rule).and_then(|source| {
            source.actions.iter().find_map(|action| match action {
                Action::SetValue {
                    key,
                    value: Some(value),
                    ..
                } if *key == dependency.key => Some(value.clone().coerced()),
                _ => None,
            })
        });
        if let Some(value) = static_value {
            return DependencyValue {
                value,
                from_condition: false,
            };
        }

        let key = dependency.key.to_ascii_lowercase();
        let value = if FLAG_KEY_HINTS.iter().any(|hint| key.contains(hint)) {
            Scalar::Bool(true)
        } else {
            Scalar::Number(1.0)
        };
        DependencyValue {
            value,
            from_condition: false,
        }
    }

    fn missing_value(&self, target: &RuleDefinition, key: &str, present: &DependencyValue) -> Scalar {
        match &present.value {
            Scalar::Bool(b) => Scalar::Bool(!b),
            Scalar::Number(_) if present.from_condition => self
                .values
                .derive_for_sensor(&target.conditions, key, Polarity::Negative)
                .unwrap_or_else(|| opposite_value(&present.value)),
            Scalar::Number(_) => opposite_value(&present.value),
            Scalar::Text(_) => Scalar::Text(MISSING_DEPENDENCY_TEXT.to_string()),
        }
    }

    // ========================================================================
    // Temporal scenarios
    // ========================================================================

    /// Number of samples and per-sample delay covering `duration_ms`
    pub fn temporal_schedule(&self, duration_ms: u64) -> (u64, u64) {
        let by_granularity = duration_ms
            .checked_div(self.config.temporal_step_ms)
            .unwrap_or_default();
        let steps = by_granularity.max(self.config.min_temporal_steps).max(1);
        (steps, duration_ms.div_ceil(steps))
    }

    /// One scenario per threshold-over-time condition of `rule`
    pub fn generate_temporal_scenarios(
        &self,
        rule: &RuleDefinition,
        analysis: &RuleAnalysis,
    ) -> Result<Vec<TestScenario>> {
        let base = self.build_inputs(rule, analysis, Polarity::Positive, Polarity::Positive)?;

        let mut scenarios = Vec::new();
        for (index, temporal) in temporal_conditions(&rule.conditions).into_iter().enumerate() {
            let (steps, delay_ms) = self.temporal_schedule(temporal.duration_ms);

            let name = match index {
                0 => format!("{}_temporal", rule.name),
                n => format!("{}_temporal_{}", rule.name, n + 1),
            };
            let mut scenario = TestScenario::new(
                name,
                format!(
                    "{}: {} {} {} held for {} ms",
                    rule.name,
                    temporal.sensor,
                    temporal.operator,
                    temporal.threshold,
                    temporal.duration_ms
                ),
            );
            scenario.clear_outputs = true;

            for step in 0..steps {
                let mut inputs = base.clone();
                inputs.insert(
                    temporal.sensor.clone(),
                    self.values
                        .value_for_temporal(temporal, step, steps, Polarity::Positive),
                );
                scenario.input_sequence.push(SequenceStep { inputs, delay_ms });
            }

            // The engine fires on the last sample it holds
            let last = scenario
                .input_sequence
                .last()
                .map_or_else(|| base.clone(), |sample| sample.inputs.clone());
            let outputs = self.expected_outputs(rule, &bindings_from(&last));
            scenario.pre_set_outputs = pre_set_for(&outputs);
            scenario.expected_outputs = outputs;

            debug!(
                rule = %rule.name,
                sensor = %temporal.sensor,
                steps,
                delay_ms,
                "Generated temporal scenario"
            );
            scenarios.push(scenario);
        }

        Ok(scenarios)
    }
}

/// Pre-set value simulating an upstream output
#[derive(Debug, Clone)]
struct DependencyValue {
    value: Scalar,
    /// Back-derived from the downstream condition
    from_condition: bool,
}

/// Deterministic stand-ins for expressions the evaluator rejects
fn expression_fallback(
    expression: &str,
    bindings: &HashMap<String, Option<Scalar>>,
) -> Option<Scalar> {
    let trimmed = expression.trim();

    if let Some(b) = parse_bool_keyword(trimmed) {
        return Some(Scalar::Bool(b));
    }

    if trimmed.contains("now()") {
        return Some(Scalar::Text(chrono::Utc::now().to_rfc3339()));
    }

    if trimmed.contains('"') && trimmed.contains('+') {
        let text: String = trimmed
            .split('+')
            .map(str::trim)
            .map(|part| match part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
                Some(literal) => literal.to_string(),
                None => bindings
                    .get(part)
                    .and_then(|v| v.as_ref())
                    .map(Scalar::to_store_string)
                    .unwrap_or_default(),
            })
            .collect();
        return Some(Scalar::Text(text));
    }

    if trimmed.contains(['+', '-', '*', '/']) {
        return Some(Scalar::Number(0.0));
    }

    None
}
