//! Test scenario model
//!
//! Scenarios are self-describing fixtures: once generated (or written by
//! hand) they need nothing else from the rule set to run. Field names are
//! camelCase in scenario documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use voltage_calc::{parse_bool_keyword, parse_number_lenient, Scalar};

use crate::error::{HarnessError, Result};

fn default_timeout_multiplier() -> f64 {
    1.0
}

fn is_default_multiplier(value: &f64) -> bool {
    *value == 1.0
}

// ============================================================================
// Storage and validation kinds
// ============================================================================

/// Physical encoding of a value in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Plain string key
    String,
    /// Field of a hash
    Hash,
    /// JSON-encoded string key
    Json,
    /// Pub/Sub channel, write-only
    Pub,
}

/// Comparison strategy for an expectation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorKind {
    /// Infer from the expected value
    #[default]
    Auto,
    Boolean,
    Numeric,
    String,
}

impl ValidatorKind {
    fn is_auto(&self) -> bool {
        *self == ValidatorKind::Auto
    }
}

/// Infer the validator for an expected value
///
/// Null → string, native bool → boolean, native number → numeric, text that
/// reads as a bool keyword → boolean, text that reads as a number → numeric,
/// anything else → string.
pub fn validator_type(value: Option<&Scalar>) -> ValidatorKind {
    match value {
        None => ValidatorKind::String,
        Some(Scalar::Bool(_)) => ValidatorKind::Boolean,
        Some(Scalar::Number(_)) => ValidatorKind::Numeric,
        Some(Scalar::Text(s)) => {
            if parse_bool_keyword(s).is_some() {
                ValidatorKind::Boolean
            } else if parse_number_lenient(s).is_some() {
                ValidatorKind::Numeric
            } else {
                ValidatorKind::String
            }
        },
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Value written before a step's expectations are checked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInput {
    pub key: String,
    pub value: Scalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<StorageFormat>,
}

impl TestInput {
    pub fn new(key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            field: None,
            format: None,
        }
    }
}

/// Expected store value after a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExpectation {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub expected: Option<Scalar>,
    #[serde(default, skip_serializing_if = "ValidatorKind::is_auto")]
    pub validator: ValidatorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<StorageFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_ms: Option<u64>,
}

impl TestExpectation {
    pub fn new(key: impl Into<String>, expected: impl Into<Scalar>) -> Self {
        Self {
            key: key.into(),
            field: None,
            expected: Some(expected.into()),
            validator: ValidatorKind::Auto,
            format: None,
            tolerance: None,
            timeout_ms: None,
            polling_interval_ms: None,
        }
    }

    /// Validator after resolving `auto` from the expected value
    pub fn effective_validator(&self) -> ValidatorKind {
        match self.validator {
            ValidatorKind::Auto => validator_type(self.expected.as_ref()),
            explicit => explicit,
        }
    }
}

/// One step: write inputs, wait, check expectations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<TestInput>,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub expectations: Vec<TestExpectation>,
}

/// One sample of a temporal input sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    pub inputs: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub delay_ms: u64,
}

// ============================================================================
// Scenarios
// ============================================================================

/// Input vector and predicted outputs for one polarity of a rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCase {
    pub inputs: BTreeMap<String, Scalar>,
    /// `None` marks an output that cannot be predicted
    pub outputs: BTreeMap<String, Option<Scalar>>,
}

/// Self-describing test fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TestStep>,
    /// Written before the first step to prime latched outputs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pre_set_outputs: BTreeMap<String, Scalar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_sequence: Vec<SequenceStep>,
    /// Checked once after the whole input sequence
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expected_outputs: BTreeMap<String, Option<Scalar>>,
    #[serde(default)]
    pub clear_outputs: bool,
    #[serde(
        default = "default_timeout_multiplier",
        skip_serializing_if = "is_default_multiplier"
    )]
    pub timeout_multiplier: f64,
}

impl TestScenario {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            pre_set_outputs: BTreeMap::new(),
            input_sequence: Vec::new(),
            expected_outputs: BTreeMap::new(),
            clear_outputs: false,
            timeout_multiplier: default_timeout_multiplier(),
        }
    }

    /// Steps the runner executes
    ///
    /// Explicit `steps` win. Otherwise each `inputSequence` entry becomes a
    /// setup step and a final step verifies `expectedOutputs` (null entries
    /// are not checked).
    pub fn effective_steps(&self) -> Vec<TestStep> {
        if !self.steps.is_empty() || self.input_sequence.is_empty() {
            return self.steps.clone();
        }

        let mut steps: Vec<TestStep> = self
            .input_sequence
            .iter()
            .enumerate()
            .map(|(i, sample)| TestStep {
                name: format!("sequence_{}", i + 1),
                description: format!("Input sequence sample {}", i + 1),
                inputs: sample
                    .inputs
                    .iter()
                    .map(|(key, value)| TestInput::new(key.clone(), value.clone()))
                    .collect(),
                delay_ms: sample.delay_ms,
                expectations: Vec::new(),
            })
            .collect();

        steps.push(TestStep {
            name: "verify".to_string(),
            description: "Verify outputs after the input sequence".to_string(),
            inputs: Vec::new(),
            delay_ms: 0,
            expectations: self
                .expected_outputs
                .iter()
                .filter_map(|(key, value)| {
                    value
                        .as_ref()
                        .map(|v| TestExpectation::new(key.clone(), v.clone()))
                })
                .collect(),
        });
        steps
    }
}

/// Scenario file: `{ scenarios: [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDocument {
    pub scenarios: Vec<TestScenario>,
}

impl ScenarioDocument {
    pub fn new(scenarios: Vec<TestScenario>) -> Self {
        Self { scenarios }
    }

    /// Parse YAML (or JSON) text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from a `.yaml`/`.yml`/`.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if is_json(path) {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::parse(&content)
        }
    }

    /// Write as JSON or YAML depending on the extension
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        std::fs::write(path, content).map_err(HarnessError::from)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
