// Application configuration
// Loaded from a JSON file, then overridden from the environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "PYJUDGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/pyjudge.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub redis_url: String,
    /// Lifetime of a stored job result.
    pub result_ttl_secs: u64,
    /// Lifetime of a client's in-flight marker while its job runs.
    pub admission_ttl_secs: u64,
    /// Per-test wall-clock budget.
    pub run_tests_timeout_secs: f64,
    pub python_bin: String,
    pub entry_name: String,
    pub max_parallel_tests: usize,
    /// Key admission on the `x-client-id` header instead of the peer address.
    /// Only safe behind a proxy that sets the header itself.
    pub trust_client_id_header: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            result_ttl_secs: 10,
            admission_ttl_secs: 60,
            run_tests_timeout_secs: 5.0,
            python_bin: "python3".to_string(),
            entry_name: "solve".to_string(),
            max_parallel_tests: 8,
            trust_client_id_header: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `$PYJUDGE_CONFIG` (or `config/pyjudge.json`), falling back to
    /// defaults when the file does not exist, then apply env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("REDIS_URL") {
            self.redis_url = url;
        }
        if let Some(host) = lookup("PYJUDGE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PYJUDGE_PORT") {
            self.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "PYJUDGE_PORT",
                reason: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(bin) = lookup("PYTHON_BIN") {
            self.python_bin = bin;
        }
        if let Some(trust) = lookup("PYJUDGE_TRUST_CLIENT_ID_HEADER") {
            self.trust_client_id_header = trust.parse().map_err(|_| ConfigError::Invalid {
                key: "PYJUDGE_TRUST_CLIENT_ID_HEADER",
                reason: format!("'{}' is not true or false", trust),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.run_tests_timeout_secs.is_finite() && self.run_tests_timeout_secs > 0.0) {
            return Err(ConfigError::Invalid {
                key: "run_tests_timeout_secs",
                reason: "must be a positive number".to_string(),
            });
        }
        if self.result_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "result_ttl_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.admission_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "admission_ttl_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_parallel_tests == 0 {
            return Err(ConfigError::Invalid {
                key: "max_parallel_tests",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.entry_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "entry_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs_f64(self.run_tests_timeout_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn admission_ttl(&self) -> Duration {
        Duration::from_secs(self.admission_ttl_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
