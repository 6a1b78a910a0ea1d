use crate::backend::JobRequest;
use crate::error::{JobError, Result};
use crate::progress::ProgressReporter;
use crate::record::Progress;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt::Debug;

/// Context passed to job execution
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
    progress: ProgressReporter,
}

impl JobContext {
    pub fn new(request: &JobRequest, progress: ProgressReporter) -> Self {
        Self {
            job_id: request.id.clone(),
            created_at: request.created_at,
            ready_at: request.ready_at,
            progress,
        }
    }

    /// Publish a `PROGRESS` update for this job
    pub async fn report(&self, current: u64, total: u64, status: impl Into<String>) -> Result<()> {
        self.progress.report(current, total, status).await
    }
}

/// What a handler returns on success.
///
/// Progress and status left unset are filled in by the worker: progress
/// defaults to the last reported fraction completed, status to
/// [`Completion::DEFAULT_STATUS`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub result: Option<Value>,
    pub progress: Option<Progress>,
    pub status: Option<String>,
}

impl Completion {
    pub const DEFAULT_STATUS: &'static str = "Completed";

    /// Success with a result payload
    pub fn new(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    /// Success without a result payload
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, current: u64, total: u64) -> Self {
        self.progress = Some(Progress::new(current, total));
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// A job that can be executed
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// The job name/type
    const NAME: &'static str;

    /// The data required by the job
    type Data: Serialize + DeserializeOwned + Send + Sync + Debug;

    /// Reject malformed input before it is enqueued
    fn validate(&self, _data: &Self::Data) -> Result<()> {
        Ok(())
    }

    /// Execute the job
    async fn execute(&self, ctx: JobContext, data: Self::Data) -> Result<Completion>;
}

/// A type-erased job handler
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn validate(&self, data: &Value) -> Result<()>;

    async fn handle(&self, ctx: JobContext, data: Value) -> Result<Completion>;
}

#[async_trait]
impl<J: Job> JobHandler for J {
    fn validate(&self, data: &Value) -> Result<()> {
        let data: J::Data = serde_json::from_value(data.clone())
            .map_err(|e| JobError::Submission(format!("{}: {}", J::NAME, e)))?;
        Job::validate(self, &data)
    }

    async fn handle(&self, ctx: JobContext, data: Value) -> Result<Completion> {
        let data: J::Data = serde_json::from_value(data)?;
        self.execute(ctx, data).await
    }
}
