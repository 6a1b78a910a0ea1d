use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

/// A job submission as carried by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// The job must not be handed to a worker before this instant
    pub ready_at: DateTime<Utc>,
}

impl JobRequest {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at <= now
    }
}

/// Number of jobs waiting in the broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Eligible for dequeue now
    pub ready: u64,
    /// Held until their `ready_at`
    pub delayed: u64,
}

/// Broker channel between producers and workers
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Hand a job to the broker.
    /// Jobs whose `ready_at` lies in the future go to the holding area.
    async fn push(&self, job: JobRequest) -> Result<()>;

    /// Claim the next ready job.
    /// A job is delivered to at most one caller.
    async fn pop(&self) -> Result<Option<JobRequest>>;

    /// Move held jobs with `ready_at <= now` to the ready queue, in
    /// `ready_at` order and submission order among equal instants.
    /// Returns how many jobs were promoted.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Earliest `ready_at` in the holding area
    async fn next_ready_at(&self) -> Result<Option<DateTime<Utc>>>;

    async fn stats(&self) -> Result<QueueStats>;

    /// Suspend until a job may have become ready, for at most `timeout`
    async fn wait_ready(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}
