//! VoltageEMS rule test harness
//!
//! Generates test scenarios from rule definitions and runs them against a
//! live rule engine through the shared realtime store.
//!
//! - Generation: [`analyze_rules`] → [`ScenarioGenerator::generate_all`]
//! - Execution: [`TestRunner::run_all`] over a [`voltage_rtdb::Rtdb`] backend

pub mod comparison;
pub mod condition_analyzer;
pub mod config;
pub mod error;
pub mod rule_analyzer;
pub mod runner;
pub mod scenario;
pub mod scenario_generator;
pub mod store_adapter;
pub mod value_generator;

pub use config::{GeneratorConfig, HarnessConfig, RunnerConfig};
pub use error::{HarnessError, Result};
pub use rule_analyzer::{analyze_rules, Dependency, DependencyType, RuleAnalysis};
pub use runner::{RunSummary, ScenarioResult, StepResult, TestRunner};
pub use scenario::{
    ScenarioDocument, SequenceStep, StorageFormat, TestCase, TestExpectation, TestInput,
    TestScenario, TestStep, ValidatorKind,
};
pub use scenario_generator::ScenarioGenerator;
pub use store_adapter::{determine_key_format, ExpectationResult, KeyLocation, StoreAdapter};
pub use value_generator::{Polarity, ValueGenerator};

// Re-export the rule model and value type for convenience
pub use voltage_calc::Scalar;
pub use voltage_rules::{load_rules_from_file, parse_rules_str, RuleDefinition};
