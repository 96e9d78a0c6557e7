/// Test Evaluator - pass/fail grading
///
/// Pure function of (test case, result). Knows nothing about processes,
/// deadlines or storage.
///
/// **Comparison rules:**
/// - Structural equality on the JSON form of the value
/// - Numbers compare by value, so `3` matches `3.0`
/// - Tuples were already flattened to arrays on both sides
///
/// `passed` stays `None` when the case has no expected value or the call
/// failed; an error is never graded as a mismatch.

use pyjudge_common::types::{TestCase, TestResult, Value};

pub fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_match(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).map_or(false, |other| values_match(value, other)))
        }
        _ => actual == expected,
    }
}

pub fn grade(case: &TestCase, mut result: TestResult) -> TestResult {
    if let (Some(expected), Some(output), false) = (&case.expected, &result.output, result.is_error()) {
        result.passed = Some(values_match(output, expected));
    }
    result
}
