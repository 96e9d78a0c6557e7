use crate::store::{ResultStore, StoreResult};
use crate::types::JobRecord;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};
use std::time::Duration;
use tracing::debug;

/// Redis key layout - API and CLI must never drift on these names.
pub const RESULT_PREFIX: &str = "pyjudge:result";
pub const ADMISSION_PREFIX: &str = "pyjudge:admission";

const REFRESH_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const RELEASE_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Generate result key for a job
pub fn result_key(job_id: &str) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

/// Generate admission key for a client
pub fn admission_key(client_id: &str) -> String {
    format!("{}:{}", ADMISSION_PREFIX, client_id)
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX rejects 0, and sub-millisecond TTLs would expire immediately anyway.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Result store backed by Redis (requires GETDEL, Redis >= 6.2).
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl ResultStore for RedisStore {
    async fn put_job_result(&self, record: &JobRecord, ttl: Duration) -> StoreResult<()> {
        let key = result_key(record.job_id());
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn.pset_ex(&key, payload, ttl_millis(ttl)).await?;
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Stored job result");
        Ok(())
    }

    async fn take_job_result(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = redis::cmd("GETDEL")
            .arg(result_key(job_id))
            .query_async(&mut conn)
            .await?;

        match payload {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn try_admit(&self, client_id: &str, job_id: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(admission_key(client_id))
            .arg(job_id)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn admitted_job(&self, client_id: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let job_id: Option<String> = conn.get(admission_key(client_id)).await?;
        Ok(job_id)
    }

    async fn refresh_admission(&self, client_id: &str, job_id: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let script = Script::new(REFRESH_IF_OWNER);
        let refreshed: i64 = script
            .key(admission_key(client_id))
            .arg(job_id)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(refreshed == 1)
    }

    async fn release_admission(&self, client_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(admission_key(client_id)).await?;
        Ok(())
    }

    async fn release_admission_if_owner(&self, client_id: &str, job_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let script = Script::new(RELEASE_IF_OWNER);
        let released: i64 = script
            .key(admission_key(client_id))
            .arg(job_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }
}
