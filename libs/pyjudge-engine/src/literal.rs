//! Python literal conversion for test-case intake.
//!
//! Test cases arrive as literal-syntax strings such as
//! `"[{'id': 1, 'input': '[2, 7, 11, 15], 9', 'expected': '[0, 1]'}]"`.
//! Only literal expressions are accepted; names, calls and operators other
//! than a unary sign are rejected before anything reaches the engine.

use pyjudge_common::types::{TestCase, Value};
use rustpython_parser::{ast, Parse};
use serde_json::{Map, Number};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("invalid syntax: {0}")]
    Syntax(String),

    #[error("unsupported literal: {0}")]
    Unsupported(String),

    #[error("integer {0} does not fit in 64 bits")]
    IntegerOutOfRange(String),

    #[error("non-finite float")]
    NonFinite,

    #[error("invalid test case: {0}")]
    InvalidTestCase(String),
}

/// Evaluate a Python literal into a JSON value.
///
/// Tuples and sets become arrays, bytes are decoded lossily and dict keys
/// are rendered as strings.
pub fn literal_eval(text: &str) -> Result<Value, LiteralError> {
    let expr = ast::Expr::parse(text.trim(), "<literal>")
        .map_err(|e| LiteralError::Syntax(e.to_string()))?;
    expr_to_value(&expr)
}

fn expr_to_value(expr: &ast::Expr) -> Result<Value, LiteralError> {
    match expr {
        ast::Expr::Constant(constant) => constant_to_value(&constant.value),
        ast::Expr::List(list) => sequence(&list.elts),
        ast::Expr::Tuple(tuple) => sequence(&tuple.elts),
        ast::Expr::Set(set) => sequence(&set.elts),
        ast::Expr::Dict(dict) => {
            let mut map = Map::new();
            for (key, value) in dict.keys.iter().zip(&dict.values) {
                let key = key
                    .as_ref()
                    .ok_or_else(|| LiteralError::Unsupported("dict unpacking".to_string()))?;
                map.insert(key_string(expr_to_value(key)?), expr_to_value(value)?);
            }
            Ok(Value::Object(map))
        }
        ast::Expr::UnaryOp(unary) => {
            let operand = expr_to_value(&unary.operand)?;
            match operand {
                Value::Number(n) if matches!(unary.op, ast::UnaryOp::USub) => negate(&n),
                Value::Number(n) if matches!(unary.op, ast::UnaryOp::UAdd) => Ok(Value::Number(n)),
                _ => Err(LiteralError::Unsupported("unary operator".to_string())),
            }
        }
        _ => Err(LiteralError::Unsupported(
            "only literal values are allowed".to_string(),
        )),
    }
}

fn sequence(elts: &[ast::Expr]) -> Result<Value, LiteralError> {
    elts.iter()
        .map(expr_to_value)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn constant_to_value(constant: &ast::Constant) -> Result<Value, LiteralError> {
    match constant {
        ast::Constant::None => Ok(Value::Null),
        ast::Constant::Bool(b) => Ok(Value::Bool(*b)),
        ast::Constant::Str(s) => Ok(Value::String(s.to_string())),
        ast::Constant::Bytes(bytes) => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ast::Constant::Int(n) => {
            let digits = n.to_string();
            digits
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| LiteralError::IntegerOutOfRange(digits))
        }
        ast::Constant::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or(LiteralError::NonFinite),
        ast::Constant::Tuple(items) => items
            .iter()
            .map(constant_to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Err(LiteralError::Unsupported(
            "complex numbers and Ellipsis are not supported".to_string(),
        )),
    }
}

fn negate(n: &Number) -> Result<Value, LiteralError> {
    if let Some(i) = n.as_i64() {
        return i
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| LiteralError::IntegerOutOfRange(format!("-{}", i)));
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
        .ok_or(LiteralError::NonFinite)
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Parse a literal-syntax test-case collection: one dict or a sequence of dicts.
pub fn parse_test_cases(text: &str) -> Result<Vec<TestCase>, LiteralError> {
    normalize_test_cases(literal_eval(text)?)
}

/// Turn already-decoded test cases (from a literal or from JSON) into `TestCase`s.
///
/// String `input`/`expected` values are literal-evaluated again; `output` is
/// accepted as an alias of `expected`.
pub fn normalize_test_cases(value: Value) -> Result<Vec<TestCase>, LiteralError> {
    match value {
        Value::Object(case) => Ok(vec![normalize_case(case)?]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(case) => normalize_case(case),
                other => Err(LiteralError::InvalidTestCase(format!(
                    "expected a dict per test case, got {}",
                    other
                ))),
            })
            .collect(),
        other => Err(LiteralError::InvalidTestCase(format!(
            "expected a list of test cases, got {}",
            other
        ))),
    }
}

fn normalize_case(mut case: Map<String, Value>) -> Result<TestCase, LiteralError> {
    let id = case
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| LiteralError::InvalidTestCase("every test case needs an integer 'id'".to_string()))?;

    let input = match case.remove("input") {
        Some(Value::String(text)) => literal_eval(&text)?,
        Some(value) => value,
        None => Value::Array(Vec::new()),
    };

    let expected = match case.remove("expected").or_else(|| case.remove("output")) {
        Some(Value::String(text)) => Some(literal_eval(&text)?),
        Some(value) => Some(value),
        None => None,
    };

    Ok(TestCase {
        id,
        input: into_arguments(input),
        expected,
    })
}

/// A list or tuple is the argument sequence; anything else is a single argument.
pub fn into_arguments(input: Value) -> Vec<Value> {
    match input {
        Value::Array(args) => args,
        single => vec![single],
    }
}
