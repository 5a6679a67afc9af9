//! voltage-calc - Expression evaluation for VoltageEMS rule tests
//!
//! Evaluates the value expressions found in rule actions against a set of
//! store-key bindings, producing typed [`Scalar`] results.
//!
//! # Features
//!
//! - **Store key identifiers**: `input:temperature`, `output:alarm`, `state:mode`
//! - **Arithmetic and comparison**: `+ - * / %`, `< > <= >= == !=`
//! - **Logic**: `and` / `or` / `not` (and `&&` / `||` / `!`)
//! - **Strings**: literals in single or double quotes, concatenation with `+`
//! - **Functions**: `now()` (current UTC time, RFC 3339)
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use voltage_calc::{ExpressionEngine, Scalar};
//!
//! let engine = ExpressionEngine::new();
//!
//! let mut bindings = HashMap::new();
//! bindings.insert("input:power".to_string(), Some(Scalar::Number(1000.0)));
//!
//! let result = engine.evaluate("input:power * 0.5", &bindings).unwrap();
//! assert_eq!(result, Some(Scalar::Number(500.0)));
//! ```

pub mod error;
pub mod evaluator;
pub mod value;

// Re-exports for convenience
pub use error::{CalcError, Result};
pub use evaluator::{identifier_for_key, translate_expression, ExpressionEngine};
pub use value::{parse_bool_keyword, parse_bool_lenient, parse_number_lenient, Scalar};
