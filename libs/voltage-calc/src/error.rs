//! Error types for voltage-calc

use thiserror::Error;

/// Calculation errors
#[derive(Debug, Error)]
pub enum CalcError {
    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Parse error in '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Unsupported result type: {0}")]
    UnsupportedResult(String),
}

impl CalcError {
    pub fn expression(msg: impl Into<String>) -> Self {
        Self::Expression(msg.into())
    }

    pub fn parse(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::VariableNotFound(name.into())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
