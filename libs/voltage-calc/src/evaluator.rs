//! ExpressionEngine - evaluates rule value expressions
//!
//! Rule expressions reference store keys directly (`input:temperature * 2`,
//! `output:mode == "auto" and not input:door_open`). evalexpr cannot parse
//! `prefix:name` identifiers or the word operators, so every expression is first
//! translated into evalexpr syntax:
//!
//! - `input:temperature` → `input__temperature`
//! - `and` / `or` / `not` → `&&` / `||` / `!`
//! - single-quoted strings → double-quoted strings
//! - integer literals → float literals (`5 / 2` evaluates to 2.5)
//!
//! Parsed operator trees are cached by translated source for the life of the
//! engine. The set of distinct expressions is bounded by the rule files, so
//! the cache never evicts.

use crate::error::{CalcError, Result};
use crate::value::Scalar;
use dashmap::DashMap;
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError, Function,
    HashMapContext, Node, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Separator replacing `:` in store keys used as expression identifiers
const KEY_SEPARATOR: &str = "__";

/// Expression evaluator with a parsed-expression cache
///
/// # Example
/// ```
/// use std::collections::HashMap;
/// use voltage_calc::{ExpressionEngine, Scalar};
///
/// let engine = ExpressionEngine::new();
/// let mut bindings = HashMap::new();
/// bindings.insert("input:temperature".to_string(), Some(Scalar::Number(40.0)));
///
/// let result = engine.evaluate("input:temperature > 30 and true", &bindings).unwrap();
/// assert_eq!(result, Some(Scalar::Bool(true)));
/// ```
#[derive(Default)]
pub struct ExpressionEngine {
    cache: DashMap<String, Arc<Node>>,
}

impl ExpressionEngine {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Evaluate an expression against store-key bindings
    ///
    /// Text bindings are coerced (`"true"` → bool, `"12.5"` → number) before
    /// evaluation, matching how values come back from the store. A `None`
    /// binding is bound as evalexpr's empty value. An empty result maps to `None`.
    pub fn evaluate(
        &self,
        expression: &str,
        bindings: &HashMap<String, Option<Scalar>>,
    ) -> Result<Option<Scalar>> {
        let node = self.compile(expression)?;
        let context = Self::build_context(bindings)?;

        let value = node.eval_with_context(&context).map_err(|e| match e {
            EvalexprError::VariableIdentifierNotFound(name) => {
                CalcError::variable_not_found(key_from_identifier(&name))
            },
            other => CalcError::expression(format!("Failed to evaluate '{}': {}", expression, other)),
        })?;

        value_to_scalar(value, expression)
    }

    /// Number of distinct expressions parsed so far
    pub fn cached_expressions(&self) -> usize {
        self.cache.len()
    }

    fn compile(&self, expression: &str) -> Result<Arc<Node>> {
        let translated = translate_expression(expression);
        if let Some(node) = self.cache.get(&translated) {
            return Ok(Arc::clone(node.value()));
        }

        trace!(expression, translated = %translated, "Compiling expression");
        let node = evalexpr::build_operator_tree(&translated)
            .map_err(|e| CalcError::parse(expression, e.to_string()))?;
        let node = Arc::new(node);
        self.cache.insert(translated, Arc::clone(&node));
        Ok(node)
    }

    fn build_context(bindings: &HashMap<String, Option<Scalar>>) -> Result<HashMapContext> {
        let mut context = HashMapContext::new();

        for (key, value) in bindings {
            let value = match value {
                Some(scalar) => scalar_to_value(scalar.clone().coerced()),
                None => Value::Empty,
            };
            context
                .set_value(identifier_for_key(key), value)
                .map_err(|e| {
                    CalcError::expression(format!("Failed to bind variable {}: {}", key, e))
                })?;
        }

        // now() - current UTC time as RFC 3339 text
        context
            .set_function(
                "now".to_string(),
                Function::new(|_| Ok(Value::String(chrono::Utc::now().to_rfc3339()))),
            )
            .map_err(|e| CalcError::expression(format!("Failed to register now: {}", e)))?;

        Ok(context)
    }
}

/// Identifier used for a store key inside translated expressions
pub fn identifier_for_key(key: &str) -> String {
    key.replace(':', KEY_SEPARATOR)
}

fn key_from_identifier(identifier: &str) -> String {
    identifier.replacen(KEY_SEPARATOR, ":", 1)
}

/// Translate rule expression syntax into evalexpr syntax
pub fn translate_expression(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len() + 8);
    let mut i = 0;

    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';

    while i < chars.len() {
        let c = chars[i];

        // String literal, normalised to double quotes
        if c == '"' || c == '\'' {
            let quote = c;
            out.push('"');
            i += 1;
            while i < chars.len() && chars[i] != quote {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    out.push(chars[i]);
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if chars[i] == '"' {
                    out.push('\\');
                }
                out.push(chars[i]);
                i += 1;
            }
            out.push('"');
            i += 1;
            continue;
        }

        // Identifier, keyword or prefixed store key
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && is_ident(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            if i + 1 < chars.len() && chars[i] == ':' && is_ident(chars[i + 1]) {
                let rest_start = i + 1;
                i = rest_start;
                while i < chars.len() && is_ident(chars[i]) {
                    i += 1;
                }
                let rest: String = chars[rest_start..i].iter().collect();
                out.push_str(&word);
                out.push_str(KEY_SEPARATOR);
                out.push_str(&rest);
                continue;
            }

            match word.as_str() {
                "and" | "AND" => out.push_str("&&"),
                "or" | "OR" => out.push_str("||"),
                "not" | "NOT" => out.push('!'),
                "True" | "TRUE" => out.push_str("true"),
                "False" | "FALSE" => out.push_str("false"),
                _ => out.push_str(&word),
            }
            continue;
        }

        // Numeric literal, forced to float
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().collect();
            out.push_str(&literal);
            if !literal.contains(['.', 'e', 'E']) {
                out.push_str(".0");
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

fn scalar_to_value(scalar: Scalar) -> Value {
    match scalar {
        Scalar::Bool(b) => Value::Boolean(b),
        Scalar::Number(n) => Value::Float(n),
        Scalar::Text(s) => Value::String(s),
    }
}

fn value_to_scalar(value: Value, expression: &str) -> Result<Option<Scalar>> {
    match value {
        Value::Float(f) => Ok(Some(Scalar::Number(f))),
        Value::Int(i) => Ok(Some(Scalar::Number(i as f64))),
        Value::Boolean(b) => Ok(Some(Scalar::Bool(b))),
        Value::String(s) => Ok(Some(Scalar::Text(s))),
        Value::Empty => Ok(None),
        Value::Tuple(_) => Err(CalcError::UnsupportedResult(format!(
            "Expression produced a tuple: {}",
            expression
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Scalar)]) -> HashMap<String, Option<Scalar>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.clone())))
            .collect()
    }

    #[test]
    fn test_translate_prefixed_keys_and_keywords() {
        assert_eq!(
            translate_expression("input:temp > 30 and not output:alarm"),
            "input__temp > 30.0 && ! output__alarm"
        );
        assert_eq!(translate_expression("'on' + \"x\""), "\"on\" + \"x\"");
        assert_eq!(translate_expression("1.5e3 + 2"), "1.5e3 + 2.0");
    }

    #[test]
    fn test_translate_leaves_string_contents_alone() {
        assert_eq!(
            translate_expression("\"input:a and b\""),
            "\"input:a and b\""
        );
    }

    #[test]
    fn test_arithmetic_with_sensor_references() {
        let engine = ExpressionEngine::new();
        let vars = bindings(&[
            ("input:power", Scalar::Number(1000.0)),
            ("input:efficiency", Scalar::Number(0.95)),
        ]);

        let result = engine
            .evaluate("input:power * input:efficiency", &vars)
            .unwrap();
        assert_eq!(result, Some(Scalar::Number(950.0)));
    }

    #[test]
    fn test_integer_division_is_float() {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate("5 / 2", &HashMap::new()).unwrap();
        assert_eq!(result, Some(Scalar::Number(2.5)));
    }

    #[test]
    fn test_boolean_word_operators() {
        let engine = ExpressionEngine::new();
        let vars = bindings(&[
            ("input:temp", Scalar::Number(45.0)),
            ("output:alarm", Scalar::Bool(false)),
        ]);

        let result = engine
            .evaluate("input:temp > 30 and not output:alarm", &vars)
            .unwrap();
        assert_eq!(result, Some(Scalar::Bool(true)));

        let result = engine
            .evaluate("input:temp < 30 or output:alarm", &vars)
            .unwrap();
        assert_eq!(result, Some(Scalar::Bool(false)));
    }

    #[test]
    fn test_text_bindings_are_coerced() {
        let engine = ExpressionEngine::new();
        let vars = bindings(&[("input:level", Scalar::Text("12,5".to_string()))]);

        let result = engine.evaluate("input:level * 2", &vars).unwrap();
        assert_eq!(result, Some(Scalar::Number(25.0)));
    }

    #[test]
    fn test_string_concatenation() {
        let engine = ExpressionEngine::new();
        let vars = bindings(&[("state:mode", Scalar::Text("auto".to_string()))]);

        let result = engine.evaluate("'mode-' + state:mode", &vars).unwrap();
        assert_eq!(result, Some(Scalar::Text("mode-auto".to_string())));
    }

    #[test]
    fn test_now_returns_text() {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate("now()", &HashMap::new()).unwrap();
        assert!(matches!(result, Some(Scalar::Text(ref s)) if s.contains('T')));
    }

    #[test]
    fn test_missing_variable_reports_store_key() {
        let engine = ExpressionEngine::new();
        let err = engine
            .evaluate("input:missing + 1", &HashMap::new())
            .unwrap_err();
        match err {
            CalcError::VariableNotFound(name) => assert_eq!(name, "input:missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_error() {
        let engine = ExpressionEngine::new();
        let err = engine.evaluate("(1 + ", &HashMap::new()).unwrap_err();
        assert!(matches!(err, CalcError::Parse { .. }));
    }

    #[test]
    fn test_cache_reuses_parsed_expressions() {
        let engine = ExpressionEngine::new();
        let vars = bindings(&[("input:a", Scalar::Number(1.0))]);

        engine.evaluate("input:a + 1", &vars).unwrap();
        engine.evaluate("input:a + 1", &vars).unwrap();
        engine.evaluate("input:a + 2", &vars).unwrap();

        assert_eq!(engine.cached_expressions(), 2);
    }
}
