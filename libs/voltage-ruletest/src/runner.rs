//! Test runner
//!
//! Executes scenarios one at a time against the store:
//! clear outputs → seed pre-set outputs → steps in order. A step that has
//! expectations and misses any of them stops the scenario.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;
use voltage_rtdb::Rtdb;

use crate::config::RunnerConfig;
use crate::scenario::{TestExpectation, TestScenario, TestStep};
use crate::store_adapter::{ExpectationResult, StoreAdapter};

// ============================================================================
// Results
// ============================================================================

/// Outcome of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub expectations: Vec<ExpectationResult>,
    pub duration_ms: u64,
}

/// Outcome of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub description: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    /// Setup or transport failure that aborted the scenario
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScenarioResult {
    /// First step that failed
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Results document for a batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Verbose listing of every failing scenario, step and expectation
    pub fn failure_report(&self) -> String {
        let mut report = String::new();
        for result in self.results.iter().filter(|r| !r.success) {
            let _ = writeln!(report, "FAILED {} ({} ms)", result.name, result.duration_ms);
            if let Some(error) = &result.error {
                let _ = writeln!(report, "  error: {}", error);
            }
            for step in result.steps.iter().filter(|s| !s.success) {
                let _ = writeln!(report, "  step {}", step.name);
                if let Some(error) = &step.error {
                    let _ = writeln!(report, "    error: {}", error);
                }
                for expectation in step.expectations.iter().filter(|e| !e.success) {
                    let expected = expectation
                        .expected
                        .as_ref()
                        .map_or_else(|| "null".to_string(), |v| v.to_store_string());
                    let actual = expectation.actual.as_deref().unwrap_or("<missing>");
                    let _ = writeln!(
                        report,
                        "    {}: expected {}, actual {}{}",
                        expectation.key,
                        expected,
                        actual,
                        if expectation.timed_out { " [timeout]" } else { "" }
                    );
                    if let Some(details) = &expectation.details {
                        let _ = writeln!(report, "      {}", details);
                    }
                }
            }
        }
        report
    }
}

// ============================================================================
// Runner
// ============================================================================

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Scale a duration by the scenario's timeout multiplier
fn scaled(ms: u64, multiplier: f64) -> u64 {
    let multiplier = if multiplier.is_finite() && multiplier > 0.0 {
        multiplier
    } else {
        1.0
    };
    (ms as f64 * multiplier).round() as u64
}

/// Sequential scenario executor
pub struct TestRunner {
    adapter: StoreAdapter,
    config: RunnerConfig,
}

impl TestRunner {
    pub fn new(adapter: StoreAdapter, config: RunnerConfig) -> Self {
        Self { adapter, config }
    }

    /// Runner over `rtdb` using the configured default polling interval
    pub fn with_rtdb(rtdb: Arc<dyn Rtdb>, config: RunnerConfig) -> Self {
        let adapter = StoreAdapter::new(rtdb).with_polling_interval(config.polling_interval());
        Self::new(adapter, config)
    }

    pub fn adapter(&self) -> &StoreAdapter {
        &self.adapter
    }

    /// Run scenarios strictly one after another
    pub async fn run_all(&self, scenarios: &[TestScenario]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(%run_id, scenarios = scenarios.len(), "Starting test run");

        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push(self.run_scenario(scenario).await);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let summary = RunSummary {
            run_id,
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms: elapsed_ms(started),
            results,
        };
        info!(
            %run_id,
            passed = summary.passed,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Test run complete"
        );
        summary
    }

    /// Run one scenario
    pub async fn run_scenario(&self, scenario: &TestScenario) -> ScenarioResult {
        let started = Instant::now();
        debug!(scenario = %scenario.name, "Running scenario");

        let mut result = ScenarioResult {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            success: false,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
        };

        if let Err(e) = self.prepare(scenario).await {
            warn!(scenario = %scenario.name, "Scenario setup failed: {}", e);
            result.error = Some(e.to_string());
            result.duration_ms = elapsed_ms(started);
            return result;
        }

        let steps = scenario.effective_steps();
        let mut all_passed = true;
        for step in &steps {
            let step_result = self.run_step(step, scenario.timeout_multiplier).await;
            let passed = step_result.success;
            result.steps.push(step_result);
            if !passed {
                all_passed = false;
                break;
            }
        }

        result.success = all_passed;
        result.duration_ms = elapsed_ms(started);
        if result.success {
            info!(scenario = %scenario.name, duration_ms = result.duration_ms, "PASS");
        } else {
            let step = result.failed_step().map(|s| s.name.as_str()).unwrap_or("-");
            warn!(scenario = %scenario.name, step, duration_ms = result.duration_ms, "FAIL");
        }
        result
    }

    async fn prepare(&self, scenario: &TestScenario) -> crate::Result<()> {
        if scenario.clear_outputs {
            let removed = self
                .adapter
                .clear_keys(&self.config.output_clear_pattern)
                .await?;
            debug!(scenario = %scenario.name, removed, "Cleared outputs");
        }
        if !scenario.pre_set_outputs.is_empty() {
            self.adapter
                .set_pre_test_outputs(&scenario.pre_set_outputs)
                .await?;
        }
        Ok(())
    }

    /// Timeout and polling interval scaled by `multiplier`, default timeout injected
    fn effective_expectation(&self, expectation: &TestExpectation, multiplier: f64) -> TestExpectation {
        let default_timeout = self.config.default_timeout().as_millis() as u64;
        let mut effective = expectation.clone();
        effective.timeout_ms = Some(scaled(
            expectation.timeout_ms.unwrap_or(default_timeout),
            multiplier,
        ));
        effective.polling_interval_ms = expectation
            .polling_interval_ms
            .map(|ms| scaled(ms, multiplier));
        effective
    }

    async fn run_step(&self, step: &TestStep, multiplier: f64) -> StepResult {
        let started = Instant::now();
        let mut result = StepResult {
            name: step.name.clone(),
            success: false,
            error: None,
            expectations: Vec::new(),
            duration_ms: 0,
        };

        if !step.inputs.is_empty() {
            if let Err(e) = self.adapter.send_inputs(&step.inputs).await {
                if step.expectations.is_empty() {
                    warn!(step = %step.name, "Input write failed on setup step: {}", e);
                } else {
                    result.error = Some(e.to_string());
                    result.duration_ms = elapsed_ms(started);
                    return result;
                }
            }
        }

        let delay = scaled(step.delay_ms, multiplier);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let expectations: Vec<TestExpectation> = step
            .expectations
            .iter()
            .map(|e| self.effective_expectation(e, multiplier))
            .collect();

        match self.adapter.check_expectations(&expectations).await {
            Ok(checked) => {
                result.success = checked.iter().all(|e| e.success);
                result.expectations = checked;
            },
            Err(e) => result.error = Some(e.to_string()),
        }

        result.duration_ms = elapsed_ms(started);
        debug!(step = %step.name, success = result.success, duration_ms = result.duration_ms, "Step finished");
        result
    }
}
