/// Execution Coordinator - submission pipeline
///
/// **Responsibility:**
/// Take a submission from intake to a stored result.
///
/// **Pipeline:**
/// 1. Reject duplicate test-case ids
/// 2. Static validation (`validator.rs`)
/// 3. Admission: one in-flight job per client (`ResultStore::try_admit`)
/// 4. Entry-point extraction (`extractor.rs`); failure releases the admission
/// 5. Hand the job to a background task and return its id
/// 6. Background: run all tests (`runner.rs`) while re-arming the admission
///    every half admission TTL, then store the `JobResult` under the job id
///    with the result TTL and re-arm the admission to the same TTL
///
/// Retrieval (`take_result`) is read-once and frees the owning client.
///
/// Stages 1 through 4 fail the submission synchronously. After stage 5 every
/// failure is per-test and lands inside the stored result.

use crate::error::SubmitError;
use crate::executor::IsolatedExecutor;
use crate::extractor::{EntryPoint, Extractor};
use crate::runner::TestRunner;
use crate::validator;
use pyjudge_common::types::{ExecutionJob, JobRecord, JobResult, Submission, TestCase};
use pyjudge_common::{Config, ResultStore, StoreResult};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

const MIN_KEEPALIVE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub python_bin: String,
    pub entry_name: String,
    pub deadline: Duration,
    pub result_ttl: Duration,
    pub admission_ttl: Duration,
    pub max_parallel_tests: usize,
}

impl From<&Config> for JudgeSettings {
    fn from(config: &Config) -> Self {
        Self {
            python_bin: config.python_bin.clone(),
            entry_name: config.entry_name.clone(),
            deadline: config.deadline(),
            result_ttl: config.result_ttl(),
            admission_ttl: config.admission_ttl(),
            max_parallel_tests: config.max_parallel_tests,
        }
    }
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Returned to the caller once a submission is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub job_id: String,
}

/// Called once per finished job with its result and wall-clock duration.
pub type CompletionHook = Arc<dyn Fn(&JobResult, Duration) + Send + Sync>;

#[derive(Clone)]
pub struct Coordinator {
    settings: JudgeSettings,
    extractor: Extractor,
    runner: TestRunner,
    store: Arc<dyn ResultStore>,
    on_complete: Option<CompletionHook>,
}

impl Coordinator {
    pub fn new(settings: JudgeSettings, store: Arc<dyn ResultStore>) -> Self {
        let executor = IsolatedExecutor::new(settings.python_bin.clone());
        Self {
            extractor: Extractor::new(executor.clone(), settings.deadline),
            runner: TestRunner::new(executor, settings.max_parallel_tests),
            settings,
            store,
            on_complete: None,
        }
    }

    pub fn with_completion_hook(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    /// Validate, admit and extract synchronously, then run the tests in the
    /// background. Without a `client_id` admission control is skipped.
    #[instrument(skip(self, submission, test_cases, client_id), fields(client_id = client_id.as_deref().unwrap_or("-"), tests = test_cases.len()))]
    pub async fn submit(
        &self,
        submission: Submission,
        test_cases: Vec<TestCase>,
        client_id: Option<String>,
    ) -> Result<Accepted, SubmitError> {
        ensure_unique_ids(&test_cases)?;
        validator::validate_submission(&submission)?;

        let job = ExecutionJob::new(test_cases, client_id);

        if let Some(client) = &job.client_id {
            if !self
                .store
                .try_admit(client, &job.job_id, self.settings.admission_ttl)
                .await?
            {
                let running_job_id = self
                    .store
                    .admitted_job(client)
                    .await?
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(running_job_id = %running_job_id, "Admission denied");
                return Err(SubmitError::AdmissionDenied { running_job_id });
            }
        }

        let entry = match self
            .extractor
            .extract(&submission.source, &self.settings.entry_name)
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                if let Some(client) = &job.client_id {
                    self.release_if_owner(client, &job.job_id).await;
                }
                return Err(e.into());
            }
        };

        let accepted = Accepted {
            job_id: job.job_id.clone(),
        };
        info!(job_id = %job.job_id, "Job accepted");

        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.execute_job(entry, job).await });

        Ok(accepted)
    }

    #[instrument(skip(self, entry, job), fields(job_id = %job.job_id))]
    async fn execute_job(&self, entry: EntryPoint, job: ExecutionJob) {
        let started = Instant::now();
        let run = self.runner.run_job(&entry, &job, self.settings.deadline);
        let result = match &job.client_id {
            Some(client) => self.hold_admission_while(client, &job.job_id, run).await,
            None => run.await,
        };
        let duration = started.elapsed();
        info!(
            passed = result.passed,
            total = result.total,
            duration_ms = duration.as_millis() as u64,
            "Job completed"
        );
        if let Some(hook) = &self.on_complete {
            hook(&result, duration);
        }

        let record = JobRecord::new(result, job.client_id.clone());
        if let Err(e) = self.store.put_job_result(&record, self.settings.result_ttl).await {
            error!(error = %e, "Failed to store job result");
            if let Some(client) = &job.client_id {
                self.release_if_owner(client, &job.job_id).await;
            }
            return;
        }

        if let Some(client) = &job.client_id {
            if let Err(e) = self
                .store
                .refresh_admission(client, &job.job_id, self.settings.result_ttl)
                .await
            {
                warn!(error = %e, "Failed to refresh admission");
            }
        }
    }

    /// Drive `run` to completion, keeping the client's admission alive so a
    /// job that outlasts the admission TTL still blocks a second submission.
    async fn hold_admission_while<F>(&self, client_id: &str, job_id: &str, run: F) -> JobResult
    where
        F: Future<Output = JobResult>,
    {
        let ttl = self.settings.admission_ttl;
        let mut keepalive = tokio::time::interval((ttl / 2).max(MIN_KEEPALIVE));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; admission was just granted.
        keepalive.tick().await;

        tokio::pin!(run);
        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = keepalive.tick() => {
                    match self.store.refresh_admission(client_id, job_id, ttl).await {
                        Ok(true) => {}
                        Ok(false) => warn!(client_id, "Admission lost while job running"),
                        Err(e) => warn!(client_id, error = %e, "Failed to extend admission"),
                    }
                }
            }
        }
    }

    /// Read-once retrieval. `None` means unknown, not finished, already read
    /// or expired.
    #[instrument(skip(self))]
    pub async fn take_result(&self, job_id: &str) -> StoreResult<Option<JobResult>> {
        let Some(record) = self.store.take_job_result(job_id).await? else {
            return Ok(None);
        };

        if let Some(client) = &record.client_id {
            self.release_if_owner(client, job_id).await;
        }
        info!(passed = record.result.passed, total = record.result.total, "Job result retrieved");
        Ok(Some(record.result))
    }

    async fn release_if_owner(&self, client_id: &str, job_id: &str) {
        if let Err(e) = self.store.release_admission_if_owner(client_id, job_id).await {
            warn!(client_id, error = %e, "Failed to release admission");
        }
    }
}

fn ensure_unique_ids(cases: &[TestCase]) -> Result<(), SubmitError> {
    let mut seen = HashSet::with_capacity(cases.len());
    for case in cases {
        if !seen.insert(case.id) {
            return Err(SubmitError::DuplicateTestCase(case.id));
        }
    }
    Ok(())
}
