use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Argument and return values crossing the worker boundary.
pub type Value = serde_json::Value;

/// Untrusted source program plus the imports it may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub source: String,
    pub allowed_imports: HashSet<String>,
    /// Names removed from the forbidden-operation set for this submission.
    pub allowed_operations: Option<HashSet<String>>,
}

impl Submission {
    pub fn new(source: impl Into<String>, allowed_imports: HashSet<String>) -> Self {
        Self {
            source: source.into(),
            allowed_imports,
            allowed_operations: None,
        }
    }

    pub fn with_allowed_operations(mut self, operations: HashSet<String>) -> Self {
        self.allowed_operations = Some(operations);
        self
    }
}

/// Parse a comma separated allow-list such as `"math, collections"`.
pub fn parse_name_list(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    /// Positional arguments for the entry point, in call order.
    pub input: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
}

/// One accepted submission's unit of test execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub job_id: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl ExecutionJob {
    pub fn new(test_cases: Vec<TestCase>, client_id: Option<String>) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            test_cases,
            client_id,
        }
    }
}

/// Per-test failure classes. Submission-wide failures never reach a TestResult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ExecutionError,
    TimeoutError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    pub output: Option<Value>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Only set when the test case declared an expected value and the call returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl TestResult {
    pub fn returned(id: i64, output: Value, execution_time_ms: u64) -> Self {
        Self {
            id,
            output: Some(output),
            error_kind: None,
            error_message: None,
            passed: None,
            execution_time_ms,
        }
    }

    pub fn failed(id: i64, kind: ErrorKind, message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            id,
            output: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            passed: None,
            execution_time_ms,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Aggregated outcome of a job, published once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub test_results: Vec<TestResult>,
    pub passed: usize,
    pub total: usize,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    pub fn new(job_id: impl Into<String>, test_results: Vec<TestResult>) -> Self {
        let passed = test_results
            .iter()
            .filter(|result| result.passed == Some(true))
            .count();
        let total = test_results.len();
        Self {
            job_id: job_id.into(),
            test_results,
            passed,
            total,
            completed_at: Utc::now(),
        }
    }
}

/// What the store keeps under a job id: the result plus the owner, so that a
/// retrieval by job id can release the owner's admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(flatten)]
    pub result: JobResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl JobRecord {
    pub fn new(result: JobResult, client_id: Option<String>) -> Self {
        Self { result, client_id }
    }

    pub fn job_id(&self) -> &str {
        &self.result.job_id
    }
}
