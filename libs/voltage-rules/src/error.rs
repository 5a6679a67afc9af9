//! Rule loading errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuleError>;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Duplicate rule name: {0}")]
    DuplicateName(String),

    /// A rule that parsed but cannot be tested as written
    #[error("Invalid rule '{rule}': {message}")]
    Invalid { rule: String, message: String },

    #[error("Malformed rule document: {0}")]
    Malformed(String),

    #[error("Cannot read rule file: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleError {
    pub fn invalid(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::Malformed(err.to_string())
    }
}

impl From<serde_yaml::Error> for RuleError {
    fn from(err: serde_yaml::Error) -> Self {
        RuleError::Malformed(err.to_string())
    }
}
