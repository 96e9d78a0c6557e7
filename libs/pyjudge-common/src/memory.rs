use crate::store::{ResultStore, StoreResult};
use crate::types::JobRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Default)]
struct Maps {
    results: HashMap<String, Expiring<JobRecord>>,
    admissions: HashMap<String, Expiring<String>>,
}

/// In-process result store with lazy TTL expiry.
///
/// Every operation runs under one lock, which gives the same atomicity as the
/// Redis commands. Used by the CLI and by tests.
#[derive(Default)]
pub struct MemoryStore {
    maps: Mutex<Maps>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_maps<R>(&self, f: impl FnOnce(&mut Maps) -> R) -> R {
        // A panic while holding the lock cannot leave the maps half-updated.
        let mut guard = self.maps.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.results.retain(|_, entry| entry.is_live());
        guard.admissions.retain(|_, entry| entry.is_live());
        f(&mut guard)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn put_job_result(&self, record: &JobRecord, ttl: Duration) -> StoreResult<()> {
        self.with_maps(|maps| {
            maps.results
                .insert(record.job_id().to_string(), Expiring::new(record.clone(), ttl));
        });
        Ok(())
    }

    async fn take_job_result(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self.with_maps(|maps| maps.results.remove(job_id).map(|entry| entry.value)))
    }

    async fn try_admit(&self, client_id: &str, job_id: &str, ttl: Duration) -> StoreResult<bool> {
        Ok(self.with_maps(|maps| {
            if maps.admissions.contains_key(client_id) {
                return false;
            }
            maps.admissions
                .insert(client_id.to_string(), Expiring::new(job_id.to_string(), ttl));
            true
        }))
    }

    async fn admitted_job(&self, client_id: &str) -> StoreResult<Option<String>> {
        Ok(self.with_maps(|maps| maps.admissions.get(client_id).map(|entry| entry.value.clone())))
    }

    async fn refresh_admission(&self, client_id: &str, job_id: &str, ttl: Duration) -> StoreResult<bool> {
        Ok(self.with_maps(|maps| match maps.admissions.get_mut(client_id) {
            Some(entry) if entry.value == job_id => {
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }))
    }

    async fn release_admission(&self, client_id: &str) -> StoreResult<()> {
        self.with_maps(|maps| {
            maps.admissions.remove(client_id);
        });
        Ok(())
    }

    async fn release_admission_if_owner(&self, client_id: &str, job_id: &str) -> StoreResult<bool> {
        Ok(self.with_maps(|maps| {
            let owned = maps
                .admissions
                .get(client_id)
                .map_or(false, |entry| entry.value == job_id);
            if owned {
                maps.admissions.remove(client_id);
            }
            owned
        }))
    }
}
