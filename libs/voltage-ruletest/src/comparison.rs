//! Type-aware value comparison
//!
//! Store values are always text. Comparisons never fail: anything that cannot
//! be coerced simply does not match.

use voltage_calc::{parse_bool_keyword, parse_bool_lenient, parse_number_lenient, Scalar};

use crate::config::DEFAULT_TOLERANCE;
use crate::scenario::{validator_type, ValidatorKind};

/// Interpret a raw store value in the light of the expected value's type
///
/// Numeric expectations parse the text leniently (`,` decimal separator),
/// boolean expectations accept `true/false/1/0/yes/no`; unparsable text stays
/// text.
pub fn coerce_actual(raw: &str, expected: Option<&Scalar>) -> Scalar {
    match expected {
        Some(Scalar::Number(_)) => parse_number_lenient(raw)
            .map(Scalar::Number)
            .unwrap_or_else(|| Scalar::Text(raw.to_string())),
        Some(Scalar::Bool(_)) => parse_bool_lenient(raw)
            .map(Scalar::Bool)
            .unwrap_or_else(|| Scalar::Text(raw.to_string())),
        _ => Scalar::Text(raw.to_string()),
    }
}

/// Both sides read as the same boolean
pub fn compare_booleans(expected: &Scalar, actual: &Scalar) -> bool {
    match (expected.as_bool(), actual.as_bool()) {
        (Some(e), Some(a)) => e == a,
        _ => false,
    }
}

/// Both sides read as numbers within `tolerance`
pub fn compare_numbers(expected: &Scalar, actual: &Scalar, tolerance: f64) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) => (e - a).abs() <= tolerance,
        _ => false,
    }
}

/// Lenient textual equality
///
/// Null reads as empty. After trimming: boolean keywords compare as booleans,
/// numbers compare with the default tolerance, everything else compares
/// case-insensitively.
pub fn compare_strings(expected: Option<&Scalar>, actual: Option<&Scalar>) -> bool {
    let expected = expected.map(Scalar::to_store_string).unwrap_or_default();
    let actual = actual.map(Scalar::to_store_string).unwrap_or_default();
    let (expected, actual) = (expected.trim(), actual.trim());

    if expected.is_empty() && actual.is_empty() {
        return true;
    }

    if let (Some(e), Some(a)) = (parse_bool_keyword(expected), parse_bool_keyword(actual)) {
        return e == a;
    }

    if let (Some(e), Some(a)) = (parse_number_lenient(expected), parse_number_lenient(actual)) {
        return (e - a).abs() <= DEFAULT_TOLERANCE;
    }

    expected.eq_ignore_ascii_case(actual)
}

/// Dispatch on the validator kind, `auto` resolving from the expected value
pub fn compare_values(
    validator: ValidatorKind,
    expected: Option<&Scalar>,
    actual: Option<&Scalar>,
    tolerance: Option<f64>,
) -> bool {
    let kind = match validator {
        ValidatorKind::Auto => validator_type(expected),
        explicit => explicit,
    };

    match kind {
        ValidatorKind::Boolean => match (expected, actual) {
            (Some(e), Some(a)) => compare_booleans(e, a),
            _ => false,
        },
        ValidatorKind::Numeric => match (expected, actual) {
            (Some(e), Some(a)) => compare_numbers(e, a, tolerance.unwrap_or(DEFAULT_TOLERANCE)),
            _ => false,
        },
        ValidatorKind::String | ValidatorKind::Auto => compare_strings(expected, actual),
    }
}
