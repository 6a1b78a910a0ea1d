//! Shared application state and the wiring of backends chosen by configuration.

use crate::config::Settings;
use crate::mail;
use courier_jobs::jobs::{
    AuditLog, InMemoryAuditLog, MailError, MailTransport, NotificationJob, ProgressSimulationJob,
};
use courier_jobs::{InMemoryBackend, InMemoryStatusStore, JobError, JobQueue};
use std::sync::Arc;
use thiserror::Error;

/// Key prefix for everything Courier stores in Redis
#[cfg(feature = "redis")]
pub const REDIS_PREFIX: &str = "courier";

/// Failure while assembling the service at startup
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("job queue: {0}")]
    Jobs(#[from] JobError),

    #[error("mail transport: {0}")]
    Mail(#[from] MailError),

    #[cfg(feature = "postgres")]
    #[error("audit database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{setting} is set but courier was built without the `{feature}` feature")]
    FeatureDisabled {
        setting: &'static str,
        feature: &'static str,
    },

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Register both job types on `queue` and wrap it with the settings
    pub async fn new(
        settings: Settings,
        queue: JobQueue,
        audit: Arc<dyn AuditLog>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        queue
            .register_job(NotificationJob::new(audit, transport))
            .await;
        queue
            .register_job(ProgressSimulationJob::new(settings.simulation_step()))
            .await;

        Self {
            queue,
            settings: Arc::new(settings),
        }
    }

    /// Build queue, audit log and mail transport from `settings`
    pub async fn from_settings(settings: Settings) -> Result<Self, StartupError> {
        let queue = queue_from_settings(&settings)?;
        let audit = audit_from_settings(&settings).await?;
        let transport = mail::transport_from_settings(&settings)?;
        Ok(Self::new(settings, queue, audit, transport).await)
    }
}

fn queue_from_settings(settings: &Settings) -> Result<JobQueue, StartupError> {
    match &settings.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let backend = courier_jobs::RedisBackend::new(url, REDIS_PREFIX)?;
            let store =
                courier_jobs::RedisStatusStore::new(url, REDIS_PREFIX, settings.result_ttl())?;
            tracing::info!("Using Redis broker and status store");
            Ok(JobQueue::new(backend, store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(StartupError::FeatureDisabled {
            setting: "REDIS_URL",
            feature: "redis",
        }),
        None => {
            tracing::info!("Using in-memory broker and status store");
            Ok(JobQueue::new(
                InMemoryBackend::new(),
                InMemoryStatusStore::new(),
            ))
        }
    }
}

async fn audit_from_settings(settings: &Settings) -> Result<Arc<dyn AuditLog>, StartupError> {
    match &settings.database_url {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let audit = crate::audit::PgAuditLog::connect(url).await?;
            audit.ensure_schema().await?;
            tracing::info!("Using Postgres audit log");
            Ok(Arc::new(audit))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => Err(StartupError::FeatureDisabled {
            setting: "DATABASE_URL",
            feature: "postgres",
        }),
        None => {
            tracing::info!("Using in-memory audit log");
            Ok(Arc::new(InMemoryAuditLog::new()))
        }
    }
}
