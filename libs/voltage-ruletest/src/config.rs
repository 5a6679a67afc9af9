//! Harness configuration
//!
//! Loaded in layers: built-in defaults, an optional YAML/TOML/JSON file, then
//! `RULETEST_*` environment variables (`__` separates nested keys, e.g.
//! `RULETEST_RUNNER__CYCLE_TIME_MS=200`).

use common::redis::RedisConfig;
use common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "RULETEST_";

/// Default numeric comparison tolerance
pub const DEFAULT_TOLERANCE: f64 = 0.0001;

/// Default interval between expectation polls
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 100;

/// Complete harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    pub redis: RedisConfig,
    pub runner: RunnerConfig,
    pub generator: GeneratorConfig,
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Load configuration from defaults, optional file and environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Ok(common::config_loader::load_config(path, ENV_PREFIX)?)
    }
}

/// Test runner timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Engine processing cycle
    pub cycle_time_ms: u64,
    /// Extra allowance on top of three cycles for the default expectation timeout
    pub timeout_buffer_ms: u64,
    /// Polling interval used when an expectation does not set one
    pub polling_interval_ms: u64,
    /// Glob of keys removed when a scenario sets `clearOutputs`
    pub output_clear_pattern: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_time_ms: 100,
            timeout_buffer_ms: 500,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            output_clear_pattern: "output:*".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Timeout injected into expectations without one: 3 × cycle + buffer
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_time_ms.saturating_mul(3) + self.timeout_buffer_ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

/// Scenario generation policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Delay after sending inputs before checking expectations
    pub processing_delay_ms: u64,
    /// Target spacing of temporal sequence steps
    pub temporal_step_ms: u64,
    /// Lower bound on temporal sequence length
    pub min_temporal_steps: u64,
    /// Value for sensors no condition constrains, positive context
    pub neutral_positive: f64,
    /// Value for sensors no condition constrains, negative context
    pub neutral_negative: f64,
    /// Tolerance attached to numeric expectations
    pub default_tolerance: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            processing_delay_ms: 500,
            temporal_step_ms: 500,
            min_temporal_steps: 3,
            neutral_positive: 50.0,
            neutral_negative: 0.0,
            default_tolerance: DEFAULT_TOLERANCE,
        }
    }
}
