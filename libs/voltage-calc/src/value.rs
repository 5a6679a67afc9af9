//! Scalar values shared by rule definitions, expressions and the store
//!
//! The store is textual; everything the harness writes or reads passes through
//! [`Scalar`] and the lenient parsers in this module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed value: boolean, number or text
///
/// Null is modelled as `Option<Scalar>` at the use site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Coerce raw text into the most specific scalar
    ///
    /// `"true"` → `Bool(true)`, `"42.5"` → `Number(42.5)`, anything else stays text.
    pub fn from_text_coerced(text: &str) -> Self {
        if let Some(b) = parse_bool_keyword(text) {
            return Scalar::Bool(b);
        }
        if let Some(n) = parse_number_lenient(text) {
            return Scalar::Number(n);
        }
        Scalar::Text(text.to_string())
    }

    /// Apply [`Scalar::from_text_coerced`] to text values, pass others through
    pub fn coerced(self) -> Self {
        match self {
            Scalar::Text(s) => Scalar::from_text_coerced(&s),
            other => other,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Scalar::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Scalar::Number(_))
    }

    /// Numeric view: numbers as-is, booleans as 1/0, text parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Text(s) => parse_number_lenient(s),
        }
    }

    /// Boolean view: accepts true/false/1/0/yes/no for text, 1/0 for numbers
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Number(n) if *n == 1.0 => Some(true),
            Scalar::Number(n) if *n == 0.0 => Some(false),
            Scalar::Number(_) => None,
            Scalar::Text(s) => parse_bool_lenient(s),
        }
    }

    /// Text form written to the store
    pub fn to_store_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Strict boolean keywords: `true` / `false`, case-insensitive
pub fn parse_bool_keyword(text: &str) -> Option<bool> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Lenient boolean parsing used when reading values back from the store
pub fn parse_bool_lenient(text: &str) -> Option<bool> {
    let trimmed = text.trim();
    if let Some(b) = parse_bool_keyword(trimmed) {
        return Some(b);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "1" | "yes" => Some(true),
        "0" | "no" => Some(false),
        _ => None,
    }
}

/// Locale-tolerant number parsing
///
/// Accepts `,` as decimal separator when no `.` is present (`"3,5"` → 3.5).
/// Non-finite results (`"NaN"`, `"inf"`) are rejected.
pub fn parse_number_lenient(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = trimmed.parse::<f64>().ok().or_else(|| {
        if trimmed.contains(',') && !trimmed.contains('.') {
            trimmed.replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    })?;
    parsed.is_finite().then_some(parsed)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_text_coercion() {
        assert_eq!(Scalar::from_text_coerced("true"), Scalar::Bool(true));
        assert_eq!(Scalar::from_text_coerced("FALSE"), Scalar::Bool(false));
        assert_eq!(Scalar::from_text_coerced("42.5"), Scalar::Number(42.5));
        assert_eq!(Scalar::from_text_coerced("3,5"), Scalar::Number(3.5));
        assert_eq!(
            Scalar::from_text_coerced("alarm"),
            Scalar::Text("alarm".to_string())
        );
        // "1" is numeric, not a boolean keyword
        assert_eq!(Scalar::from_text_coerced("1"), Scalar::Number(1.0));
    }

    #[test]
    fn test_lenient_bool() {
        assert_eq!(parse_bool_lenient(" Yes "), Some(true));
        assert_eq!(parse_bool_lenient("0"), Some(false));
        assert_eq!(parse_bool_lenient("maybe"), None);
    }

    #[test]
    fn test_lenient_number_rejects_non_finite() {
        assert_eq!(parse_number_lenient("NaN"), None);
        assert_eq!(parse_number_lenient("inf"), None);
        assert_eq!(parse_number_lenient(""), None);
        assert_eq!(parse_number_lenient("1,000.5"), None);
        assert_eq!(parse_number_lenient("-12.25"), Some(-12.25));
    }

    #[test]
    fn test_store_string() {
        assert_eq!(Scalar::Number(45.0).to_store_string(), "45");
        assert_eq!(Scalar::Number(0.5).to_store_string(), "0.5");
        assert_eq!(Scalar::Bool(true).to_store_string(), "true");
        assert_eq!(Scalar::from("on").to_store_string(), "on");
    }

    #[test]
    fn test_untagged_deserialize() {
        let values: Vec<Scalar> = serde_yaml::from_str("[true, 30, 2.5, hello]").unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Bool(true),
                Scalar::Number(30.0),
                Scalar::Number(2.5),
                Scalar::Text("hello".to_string()),
            ]
        );
    }
}
