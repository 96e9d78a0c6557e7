use crate::types::JobRecord;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// TTL-backed job result map plus the per-client admission map.
///
/// Implementations must make `take_job_result` an atomic get-and-delete and
/// `try_admit` an atomic set-if-absent, so that two readers never observe the
/// same result and two submissions from one client are never both admitted.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store a completed job under its job id. Overwrites are allowed.
    async fn put_job_result(&self, record: &JobRecord, ttl: Duration) -> StoreResult<()>;

    /// Read and delete a job result. A second call returns `None`.
    async fn take_job_result(&self, job_id: &str) -> StoreResult<Option<JobRecord>>;

    /// Record `client_id -> job_id` unless a live record exists. Returns whether
    /// the client was admitted; a rejected call leaves the existing record alone.
    async fn try_admit(&self, client_id: &str, job_id: &str, ttl: Duration) -> StoreResult<bool>;

    /// The job currently holding the client's admission, if any.
    async fn admitted_job(&self, client_id: &str) -> StoreResult<Option<String>>;

    /// Reset the admission TTL, only if the record still points at `job_id`.
    async fn refresh_admission(&self, client_id: &str, job_id: &str, ttl: Duration) -> StoreResult<bool>;

    async fn release_admission(&self, client_id: &str) -> StoreResult<()>;

    /// Delete the admission only if it still points at `job_id`, as one atomic
    /// step. Returns whether a record was deleted.
    async fn release_admission_if_owner(&self, client_id: &str, job_id: &str) -> StoreResult<bool>;
}
