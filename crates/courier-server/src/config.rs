//! Configuration loaded from `.env` files and environment variables.
//!
//! ```ignore
//! use courier_server::config::{load_dotenv, Settings};
//!
//! load_dotenv();
//! let settings = Settings::from_env()?;
//! ```

use courier_jobs::{EngineConfig, WorkerConfig};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Error type for configuration loading failures.
#[derive(Debug)]
pub enum ConfigError {
    /// Environment variable deserialization failed.
    EnvyError(envy::Error),
    /// A setting parsed but its value cannot be used.
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvyError(e) => write!(f, "Configuration error: {}", e),
            ConfigError::Invalid { key, reason } => write!(f, "Invalid {}: {}", key, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::EnvyError(e) => Some(e),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl From<envy::Error> for ConfigError {
    fn from(err: envy::Error) -> Self {
        ConfigError::EnvyError(err)
    }
}

/// Environment profile, read from `COURIER_ENV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Custom(String),
}

impl Environment {
    pub fn current() -> Self {
        Self::parse(std::env::var("COURIER_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("production") | Some("prod") => Self::Production,
            Some("development") | Some("dev") | None => Self::Development,
            Some(other) => Self::Custom(other.to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production | Self::Custom(_) => "info",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load `.env` from the working directory if present.
///
/// Existing environment variables win over values in the file.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }
}

/// Service settings. Every field maps to the upper-cased environment variable
/// of the same name (`bind_addr` is `BIND_ADDR`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,
    #[serde(default = "default_scheduler_tick_ms")]
    pub scheduler_tick_ms: u64,
    #[serde(default = "default_simulation_step_ms")]
    pub simulation_step_ms: u64,
    #[serde(default = "default_email_delay_secs")]
    pub email_delay_secs: u64,
    #[serde(default = "default_mail_default_sender")]
    pub mail_default_sender: String,
    #[serde(default = "default_email_subject")]
    pub email_subject: String,

    /// Redis broker and status store; in-memory when unset
    pub redis_url: Option<String>,
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// Postgres audit log; in-memory when unset
    pub database_url: Option<String>,

    /// SMTP relay; mail is only logged when unset
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_worker_poll_interval_ms() -> u64 {
    100
}

fn default_scheduler_tick_ms() -> u64 {
    250
}

fn default_simulation_step_ms() -> u64 {
    1000
}

fn default_email_delay_secs() -> u64 {
    60
}

fn default_mail_default_sender() -> String {
    "courier@example.com".to_string()
}

fn default_email_subject() -> String {
    "Hello from Courier".to_string()
}

fn default_result_ttl_secs() -> u64 {
    86_400
}

fn default_smtp_port() -> u16 {
    587
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        envy::from_env::<Settings>()?.checked()
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Settings>(vars)?.checked()
    }

    fn checked(self) -> Result<Self, ConfigError> {
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.scheduler_tick_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "SCHEDULER_TICK_MS",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: WorkerConfig {
                concurrency: self.worker_concurrency,
                poll_interval: Duration::from_millis(self.worker_poll_interval_ms),
            },
            scheduler_tick: Duration::from_millis(self.scheduler_tick_ms),
        }
    }

    pub fn simulation_step(&self) -> Duration {
        Duration::from_millis(self.simulation_step_ms)
    }

    pub fn email_delay(&self) -> Duration {
        Duration::from_secs(self.email_delay_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            worker_concurrency: default_worker_concurrency(),
            worker_poll_interval_ms: default_worker_poll_interval_ms(),
            scheduler_tick_ms: default_scheduler_tick_ms(),
            simulation_step_ms: default_simulation_step_ms(),
            email_delay_secs: default_email_delay_secs(),
            mail_default_sender: default_mail_default_sender(),
            email_subject: default_email_subject(),
            redis_url: None,
            result_ttl_secs: default_result_ttl_secs(),
            database_url: None,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
        }
    }
}
