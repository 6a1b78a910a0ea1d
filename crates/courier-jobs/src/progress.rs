use crate::error::Result;
use crate::record::{JobRecord, JobState, Progress};
use crate::store::StatusStore;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Publishes a running job's progress ticks to the status store.
///
/// Owned by the worker executing the job, so each record has a single writer.
/// `current` never moves backwards within one execution: a lower value is
/// clamped to the last reported one.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn StatusStore>,
    record: Arc<Mutex<JobRecord>>,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn StatusStore>, record: JobRecord) -> Self {
        Self {
            store,
            record: Arc::new(Mutex::new(record)),
        }
    }

    /// Write a `PROGRESS` record for `current / total`
    pub async fn report(&self, current: u64, total: u64, status: impl Into<String>) -> Result<()> {
        let mut record = self.record.lock().await;

        let last = record.progress.current;
        let current = if record.state == JobState::Progress && current < last {
            tracing::warn!(
                job_id = %record.id,
                reported = current,
                last,
                "Progress went backwards, keeping last value"
            );
            last
        } else {
            current
        };

        let next = record.advanced(Progress::new(current, total), status);
        self.store.put(next.clone()).await?;
        *record = next;
        Ok(())
    }

    /// The last record this reporter wrote (or started from)
    pub async fn snapshot(&self) -> JobRecord {
        self.record.lock().await.clone()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}
