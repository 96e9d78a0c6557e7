// Prometheus metrics for the API process (default registry).

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use pyjudge_common::types::{ErrorKind, JobResult};
use std::time::Duration;

lazy_static! {
    pub static ref SUBMISSIONS: IntCounterVec = register_int_counter_vec!(
        "pyjudge_submissions_total",
        "Submissions by outcome",
        &["outcome"]
    )
    .expect("submissions counter");
    pub static ref RESULTS_RETRIEVED: IntCounterVec = register_int_counter_vec!(
        "pyjudge_results_retrieved_total",
        "Result lookups by whether a result was returned",
        &["found"]
    )
    .expect("results counter");
    pub static ref TEST_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "pyjudge_test_outcomes_total",
        "Per-test outcomes of completed jobs",
        &["outcome"]
    )
    .expect("test outcome counter");
    pub static ref JOB_DURATION: Histogram = register_histogram!(
        "pyjudge_job_duration_seconds",
        "Wall-clock time from job start to all tests finished",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("job duration histogram");
}

pub fn record_submission(outcome: &str) {
    SUBMISSIONS.with_label_values(&[outcome]).inc();
}

pub fn record_retrieval(found: bool) {
    RESULTS_RETRIEVED
        .with_label_values(&[if found { "true" } else { "false" }])
        .inc();
}

/// Completion hook handed to the coordinator.
pub fn observe_job(result: &JobResult, duration: Duration) {
    JOB_DURATION.observe(duration.as_secs_f64());
    for test in &result.test_results {
        let outcome = match (test.error_kind, test.passed) {
            (Some(ErrorKind::TimeoutError), _) => "timeout",
            (Some(ErrorKind::ExecutionError), _) => "error",
            (None, Some(true)) => "passed",
            (None, Some(false)) => "failed",
            (None, None) => "returned",
        };
        TEST_OUTCOMES.with_label_values(&[outcome]).inc();
    }
}

/// Render the default registry in the text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
