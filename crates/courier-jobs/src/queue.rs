use crate::backend::{JobBackend, JobRequest, QueueStats};
use crate::error::{JobError, Result};
use crate::job::{Completion, Job, JobContext, JobHandler};
use crate::progress::ProgressReporter;
use crate::record::{JobRecord, Progress, StatusView};
use crate::store::StatusStore;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Main job queue manager.
///
/// Producers submit through it, pollers read status through it and workers
/// execute through it. Cloning is cheap; clones share the broker, the status
/// store and the handler registry.
#[derive(Clone)]
pub struct JobQueue {
    backend: Arc<dyn JobBackend>,
    store: Arc<dyn StatusStore>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
}

impl JobQueue {
    /// Create a new job queue with a broker and a status store
    pub fn new<B, S>(backend: B, store: S) -> Self
    where
        B: JobBackend + 'static,
        S: StatusStore + 'static,
    {
        Self::from_shared(Arc::new(backend), Arc::new(store))
    }

    pub fn from_shared(backend: Arc<dyn JobBackend>, store: Arc<dyn StatusStore>) -> Self {
        Self {
            backend,
            store,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn backend(&self) -> Arc<dyn JobBackend> {
        Arc::clone(&self.backend)
    }

    /// Register a job handler
    pub async fn register_job<J: Job>(&self, job: J) {
        let mut handlers = self.handlers.write().await;
        handlers.insert(J::NAME.to_string(), Arc::new(job));
        tracing::info!(job_type = J::NAME, "Registered job handler");
    }

    pub async fn registered_types(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }

    /// Submit a job that is eligible immediately
    pub async fn submit<J: Job>(&self, data: J::Data) -> Result<String> {
        self.submit_opts::<J>(data, SubmitOptions::default()).await
    }

    /// Submit a job that becomes eligible after `delay`
    pub async fn submit_delayed<J: Job>(&self, data: J::Data, delay: Duration) -> Result<String> {
        self.submit_opts::<J>(data, SubmitOptions::new().delay(delay))
            .await
    }

    /// Submit a job with options
    pub async fn submit_opts<J: Job>(&self, data: J::Data, opts: SubmitOptions) -> Result<String> {
        let payload = serde_json::to_value(data)?;
        self.submit_raw(J::NAME, payload, opts).await
    }

    /// Submit a job by type tag with an untyped payload.
    ///
    /// The payload is validated by the registered handler before anything is
    /// stored; the pending record is visible before the broker sees the job.
    pub async fn submit_raw(
        &self,
        name: &str,
        payload: serde_json::Value,
        opts: SubmitOptions,
    ) -> Result<String> {
        let handler = self.handler(name).await?;
        handler.validate(&payload)?;

        let now = Utc::now();
        let request = JobRequest {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            payload,
            created_at: now,
            ready_at: opts.ready_at(now)?,
        };

        self.store.put(JobRecord::pending(&request)).await?;
        self.backend.push(request.clone()).await?;

        tracing::info!(
            job_id = %request.id,
            job_type = %request.name,
            ready_at = %request.ready_at,
            "Job submitted"
        );
        Ok(request.id)
    }

    /// Current status of a job, `PENDING` for ids without a record
    pub async fn status(&self, id: &str) -> Result<StatusView> {
        Ok(self
            .store
            .get(id)
            .await?
            .map(|record| StatusView::from(&record))
            .unwrap_or_else(StatusView::pending))
    }

    /// Full record of a job, if any
    pub async fn record(&self, id: &str) -> Result<Option<JobRecord>> {
        self.store.get(id).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.backend.stats().await
    }

    /// Suspend until the broker may have a ready job, at most `timeout`
    pub async fn wait_ready(&self, timeout: Duration) {
        self.backend.wait_ready(timeout).await
    }

    /// Process a single ready job, if any.
    ///
    /// Returns `Ok(true)` when a job was taken off the broker. Handler errors
    /// and panics end up in the job's `FAILURE` record; only broker and store
    /// errors are returned.
    pub async fn process_one(&self) -> Result<bool> {
        match self.backend.pop().await? {
            Some(request) => {
                self.execute(request).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn execute(&self, request: JobRequest) -> Result<()> {
        let existing = self.store.get(&request.id).await?;
        if existing.as_ref().is_some_and(JobRecord::is_terminal) {
            tracing::debug!(job_id = %request.id, "Skipping redelivered job that already finished");
            return Ok(());
        }
        let record = existing.unwrap_or_else(|| JobRecord::pending(&request));

        let handler = match self.handler(&request.name).await {
            Ok(handler) => handler,
            Err(_) => {
                tracing::error!(job_id = %request.id, job_type = %request.name, "No handler for job");
                return self
                    .store
                    .put(record.failed(format!("No handler for job: {}", request.name)))
                    .await;
            }
        };

        tracing::info!(job_id = %request.id, job_type = %request.name, "Executing job");

        let reporter = ProgressReporter::new(Arc::clone(&self.store), record);
        let ctx = JobContext::new(&request, reporter.clone());
        let outcome = AssertUnwindSafe(handler.handle(ctx, request.payload.clone()))
            .catch_unwind()
            .await;

        let last = reporter.snapshot().await;
        let finished = match outcome {
            Ok(Ok(completion)) => {
                tracing::info!(job_id = %request.id, "Job succeeded");
                complete(&last, completion)
            }
            Ok(Err(e)) if e.is_infrastructure() => return Err(e),
            Ok(Err(e)) => {
                tracing::warn!(job_id = %request.id, error = %e, "Job failed");
                last.failed(&e)
            }
            Err(panic) => {
                let message = panic_message(panic);
                tracing::error!(job_id = %request.id, error = %message, "Job handler panicked");
                last.failed(message)
            }
        };

        self.store.put(finished).await
    }

    async fn handler(&self, name: &str) -> Result<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| JobError::UnknownJobType(name.to_string()))
    }
}

fn complete(last: &JobRecord, completion: Completion) -> JobRecord {
    let progress = completion.progress.unwrap_or_else(|| {
        let total = last.progress.total;
        Progress::new(total, total)
    });
    let status = completion
        .status
        .unwrap_or_else(|| Completion::DEFAULT_STATUS.to_string());
    last.succeeded(progress, status, completion.result)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "job handler panicked".to_string()
    }
}

/// Options for submitting a job
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub run_at: Option<DateTime<Utc>>,
    pub delay: Option<Duration>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run no earlier than `at`
    pub fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.run_at = Some(at);
        self
    }

    /// Run no earlier than `delay` after submission
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Eligibility instant for a job submitted at `now`
    pub fn ready_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let base = self.run_at.unwrap_or(now).max(now);
        match self.delay {
            None => Ok(base),
            Some(delay) => chrono::Duration::from_std(delay)
                .ok()
                .and_then(|delay| base.checked_add_signed(delay))
                .ok_or_else(|| JobError::Submission(format!("delay out of range: {:?}", delay))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::record::JobState;
    use crate::store::memory::InMemoryStatusStore;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct CountData {
        steps: u64,
    }

    #[derive(Clone, Default)]
    struct CountJob {
        executions: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Job for CountJob {
        const NAME: &'static str = "count";
        type Data = CountData;

        fn validate(&self, data: &Self::Data) -> Result<()> {
            if data.steps == 0 {
                return Err(JobError::Submission("steps must be positive".to_string()));
            }
            Ok(())
        }

        async fn execute(&self, ctx: JobContext, data: Self::Data) -> Result<Completion> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            for step in 0..data.steps {
                ctx.report(step, data.steps, format!("step {}", step)).await?;
            }
            Ok(Completion::new(json!(data.steps)))
        }
    }

    #[derive(Clone)]
    struct BrokenJob;

    #[async_trait]
    impl Job for BrokenJob {
        const NAME: &'static str = "broken";
        type Data = bool;

        async fn execute(&self, ctx: JobContext, should_panic: bool) -> Result<Completion> {
            ctx.report(2, 4, "halfway").await?;
            if should_panic {
                panic!("wires crossed");
            }
            Err(JobError::handler("disk on fire"))
        }
    }

    async fn queue() -> (JobQueue, CountJob) {
        let queue = JobQueue::new(InMemoryBackend::new(), InMemoryStatusStore::new());
        let job = CountJob::default();
        queue.register_job(job.clone()).await;
        queue.register_job(BrokenJob).await;
        (queue, job)
    }

    #[tokio::test]
    async fn submitted_job_is_pending_until_processed() {
        let (queue, job) = queue().await;
        let id = queue.submit::<CountJob>(CountData { steps: 3 }).await.unwrap();

        assert_eq!(queue.status(&id).await.unwrap(), StatusView::pending());

        assert!(queue.process_one().await.unwrap());
        assert_eq!(job.executions.load(Ordering::SeqCst), 1);

        let view = queue.status(&id).await.unwrap();
        assert_eq!(view.state, JobState::Success);
        assert_eq!((view.current, view.total), (3, 3));
        assert_eq!(view.status, Completion::DEFAULT_STATUS);
        assert_eq!(view.result, Some(json!(3)));

        assert!(!queue.process_one().await.unwrap());
    }

    #[tokio::test]
    async fn unknown_id_reads_as_pending() {
        let (queue, _) = queue().await;
        assert_eq!(queue.status("never-submitted").await.unwrap(), StatusView::pending());
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_enqueue() {
        let (queue, _) = queue().await;

        let err = queue
            .submit::<CountJob>(CountData { steps: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Submission(_)));

        let err = queue
            .submit_raw("count", json!({"steps": "many"}), SubmitOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Submission(_)));

        let err = queue
            .submit_raw("nope", json!({}), SubmitOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownJobType(_)));

        assert_eq!(queue.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn handler_error_becomes_failure_record() {
        let (queue, _) = queue().await;
        let id = queue.submit::<BrokenJob>(false).await.unwrap();

        assert!(queue.process_one().await.unwrap());

        let view = queue.status(&id).await.unwrap();
        assert_eq!(view.state, JobState::Failure);
        assert_eq!((view.current, view.total), (1, 1));
        assert_eq!(view.status, "disk on fire");
    }

    #[tokio::test]
    async fn handler_panic_does_not_escape() {
        let (queue, _) = queue().await;
        let id = queue.submit::<BrokenJob>(true).await.unwrap();

        assert!(queue.process_one().await.unwrap());

        let view = queue.status(&id).await.unwrap();
        assert_eq!(view.state, JobState::Failure);
        assert_eq!(view.status, "wires crossed");
    }

    #[tokio::test]
    async fn redelivered_finished_job_is_skipped() {
        let (queue, job) = queue().await;
        let id = queue.submit::<CountJob>(CountData { steps: 2 }).await.unwrap();
        assert!(queue.process_one().await.unwrap());

        let record = queue.record(&id).await.unwrap().unwrap();
        let now = Utc::now();
        queue
            .backend()
            .push(JobRequest {
                id: id.clone(),
                name: "count".to_string(),
                payload: record.payload.clone(),
                created_at: now,
                ready_at: now,
            })
            .await
            .unwrap();

        assert!(queue.process_one().await.unwrap());
        assert_eq!(job.executions.load(Ordering::SeqCst), 1);
        assert_eq!(queue.record(&id).await.unwrap().unwrap(), record);
    }

    #[tokio::test]
    async fn delayed_job_waits_in_holding_area() {
        let (queue, job) = queue().await;
        let submitted = Utc::now();
        let id = queue
            .submit_delayed::<CountJob>(CountData { steps: 1 }, Duration::from_secs(60))
            .await
            .unwrap();

        let record = queue.record(&id).await.unwrap().unwrap();
        assert!(record.ready_at >= submitted + chrono::Duration::seconds(60));

        assert!(!queue.process_one().await.unwrap());
        assert_eq!(job.executions.load(Ordering::SeqCst), 0);
        assert_eq!(
            queue.stats().await.unwrap(),
            QueueStats { ready: 0, delayed: 1 }
        );
        assert_eq!(queue.status(&id).await.unwrap(), StatusView::pending());
    }

    #[test]
    fn ready_at_adds_delay_to_submission_time() {
        let now = Utc::now();
        assert_eq!(SubmitOptions::new().ready_at(now).unwrap(), now);

        let opts = SubmitOptions::new().delay(Duration::from_secs(5));
        assert_eq!(opts.ready_at(now).unwrap(), now + chrono::Duration::seconds(5));

        let past = now - chrono::Duration::seconds(30);
        assert_eq!(SubmitOptions::new().run_at(past).ready_at(now).unwrap(), now);

        let err = SubmitOptions::new()
            .delay(Duration::from_secs(u64::MAX))
            .ready_at(now)
            .unwrap_err();
        assert!(matches!(err, JobError::Submission(_)));
    }
}
