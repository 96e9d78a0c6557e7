// Parallel Test Runner
// One worker process per test case, all cases in flight together (bounded per
// job by a semaphore), each under its own deadline. Exactly one TestResult per
// id, in input order.

use crate::evaluator;
use crate::executor::{IsolatedExecutor, WorkerReply};
use crate::extractor::EntryPoint;
use futures_util::future::join_all;
use pyjudge_common::types::{ErrorKind, ExecutionJob, JobResult, TestCase, TestResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone)]
pub struct TestRunner {
    executor: IsolatedExecutor,
    max_parallel_tests: usize,
}

impl TestRunner {
    pub fn new(executor: IsolatedExecutor, max_parallel_tests: usize) -> Self {
        Self {
            executor,
            max_parallel_tests: max_parallel_tests.max(1),
        }
    }

    /// Run every case against `entry`. Never fails as a whole: a case that
    /// errors, times out or whose task dies still gets its result.
    #[instrument(skip(self, entry, cases), fields(tests = cases.len(), deadline_ms = deadline.as_millis() as u64))]
    pub async fn run(&self, entry: &EntryPoint, cases: &[TestCase], deadline: Duration) -> Vec<TestResult> {
        let ids: Vec<i64> = cases.iter().map(|case| case.id).collect();
        // Scoped to this call, so one job's slow tests never hold another job's slots.
        let permits = Arc::new(Semaphore::new(self.max_parallel_tests));

        let handles: Vec<_> = cases
            .iter()
            .cloned()
            .map(|case| {
                let runner = self.clone();
                let entry = entry.clone();
                let permits = Arc::clone(&permits);
                tokio::spawn(async move { runner.run_one(&entry, case, deadline, &permits).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .map(|(joined, id)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(test_id = id, error = %e, "Test task failed");
                    TestResult::failed(id, ErrorKind::ExecutionError, format!("internal error: {}", e), 0)
                }
            })
            .collect()
    }

    /// Run a whole job and aggregate it.
    pub async fn run_job(&self, entry: &EntryPoint, job: &ExecutionJob, deadline: Duration) -> JobResult {
        let results = self.run(entry, &job.test_cases, deadline).await;
        debug_assert_eq!(results.len(), job.test_cases.len());
        JobResult::new(&job.job_id, results)
    }

    async fn run_one(
        &self,
        entry: &EntryPoint,
        case: TestCase,
        deadline: Duration,
        permits: &Semaphore,
    ) -> TestResult {
        let id = case.id;

        let _permit = match permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return TestResult::failed(id, ErrorKind::ExecutionError, format!("internal error: {}", e), 0)
            }
        };

        let mut worker = match self.executor.spawn(entry, &case.input) {
            Ok(worker) => worker,
            Err(e) => {
                error!(test_id = id, error = %e, "Failed to start worker");
                return TestResult::failed(
                    id,
                    ErrorKind::ExecutionError,
                    format!("failed to start interpreter: {}", e),
                    0,
                );
            }
        };

        let waited = timeout(deadline, worker.finish()).await;
        let elapsed_ms = worker.elapsed().as_millis() as u64;

        let result = match waited {
            Err(_) => {
                worker.terminate().await;
                warn!(test_id = id, elapsed_ms, "Test timed out; worker killed");
                TestResult::failed(id, ErrorKind::TimeoutError, timeout_message(id, deadline), elapsed_ms)
            }
            Ok(Ok(WorkerReply::Returned { output })) => TestResult::returned(id, output, elapsed_ms),
            Ok(Ok(WorkerReply::Raised { message })) | Ok(Ok(WorkerReply::LoadError { message })) => {
                TestResult::failed(id, ErrorKind::ExecutionError, message, elapsed_ms)
            }
            Ok(Ok(other)) => TestResult::failed(
                id,
                ErrorKind::ExecutionError,
                format!("unexpected worker reply: {:?}", other),
                elapsed_ms,
            ),
            Ok(Err(crash)) => TestResult::failed(id, ErrorKind::ExecutionError, crash, elapsed_ms),
        };

        debug!(test_id = id, elapsed_ms, error = result.is_error(), "Test finished");
        evaluator::grade(&case, result)
    }
}

pub fn timeout_message(id: i64, deadline: Duration) -> String {
    format!(
        "The execution of test case {} exceeded the allowed time limit of {} seconds; \
         Please check if the function is taking too long to execute or if there are any infinite loops in the test case.",
        id,
        deadline.as_secs_f64()
    )
}
