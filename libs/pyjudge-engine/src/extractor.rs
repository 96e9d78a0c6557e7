// Entry-Point Extractor
// Loads a validated source once in a probe worker and confirms that the
// entry name resolves to a callable. The returned handle is re-materialised
// inside every test worker.

use crate::error::ExtractionError;
use crate::executor::{IsolatedExecutor, WorkerReply};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A resolved entry point: the source that defines it plus its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    source: Arc<str>,
    name: Arc<str>,
}

impl EntryPoint {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    executor: IsolatedExecutor,
    load_timeout: Duration,
}

impl Extractor {
    pub fn new(executor: IsolatedExecutor, load_timeout: Duration) -> Self {
        Self {
            executor,
            load_timeout,
        }
    }

    pub async fn extract(&self, source: &str, entry_name: &str) -> Result<EntryPoint, ExtractionError> {
        let mut probe = self
            .executor
            .spawn_probe(source, entry_name)
            .map_err(ExtractionError::Spawn)?;

        let waited = timeout(self.load_timeout, probe.finish()).await;
        let reply = match waited {
            Ok(reply) => reply,
            Err(_) => {
                probe.terminate().await;
                warn!(timeout_ms = self.load_timeout.as_millis() as u64, "Loading submission timed out");
                return Err(ExtractionError::Load(format!(
                    "loading the submission exceeded the allowed time limit of {} seconds",
                    self.load_timeout.as_secs_f64()
                )));
            }
        };

        match reply {
            Ok(WorkerReply::Ready) => {
                debug!(entry = entry_name, elapsed_ms = probe.elapsed().as_millis() as u64, "Entry point resolved");
                Ok(EntryPoint {
                    source: Arc::from(source),
                    name: Arc::from(entry_name),
                })
            }
            Ok(WorkerReply::MissingEntry) => Err(ExtractionError::EntryPointNotFound {
                name: entry_name.to_string(),
            }),
            Ok(WorkerReply::LoadError { message }) => Err(ExtractionError::Load(message)),
            Ok(other) => Err(ExtractionError::Load(format!("unexpected worker reply: {:?}", other))),
            Err(crash) => Err(ExtractionError::Load(crash)),
        }
    }
}
