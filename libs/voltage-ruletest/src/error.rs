//! Harness Error Types

use thiserror::Error;
use voltage_calc::CalcError;
use voltage_rules::RuleError;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Rule test harness errors
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Store unreachable or command failed
    #[error("Store transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// Scenario generation failed for one unit (rule, dependency, temporal case)
    #[error("Generation failed for {unit}: {message}")]
    Generation { unit: String, message: String },

    /// Expression evaluation error
    #[error(transparent)]
    Expression(#[from] CalcError),

    /// Rule loading error
    #[error(transparent)]
    Rules(#[from] RuleError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scenario document (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn generation(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Whether the error comes from the store connection
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for HarnessError {
    fn from(err: serde_yaml::Error) -> Self {
        HarnessError::Serialization(err.to_string())
    }
}

impl From<common::Error> for HarnessError {
    fn from(err: common::Error) -> Self {
        HarnessError::Config(err.to_string())
    }
}
