use super::{JobBackend, JobRequest, QueueStats};
use crate::error::{JobError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// In-memory broker (not persistent, for testing/dev)
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
    ready_signal: Arc<Notify>,
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<JobRequest>,
    delayed: BinaryHeap<Reverse<Delayed>>,
    next_seq: u64,
}

/// Held job, ordered by `(ready_at, seq)`
#[derive(Debug)]
struct Delayed {
    seq: u64,
    job: JobRequest,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .ready_at
            .cmp(&other.job.ready_at)
            .then(self.seq.cmp(&other.seq))
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| JobError::Backend("Lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobBackend for InMemoryBackend {
    async fn push(&self, job: JobRequest) -> Result<()> {
        let mut inner = self.lock()?;
        if job.is_ready(Utc::now()) {
            inner.ready.push_back(job);
            drop(inner);
            self.ready_signal.notify_one();
        } else {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.delayed.push(Reverse(Delayed { seq, job }));
        }
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobRequest>> {
        Ok(self.lock()?.ready.pop_front())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.lock()?;
        let mut promoted = 0;
        while inner
            .delayed
            .peek()
            .is_some_and(|Reverse(held)| held.job.is_ready(now))
        {
            if let Some(Reverse(held)) = inner.delayed.pop() {
                inner.ready.push_back(held.job);
                promoted += 1;
            }
        }
        drop(inner);

        for _ in 0..promoted {
            self.ready_signal.notify_one();
        }
        Ok(promoted)
    }

    async fn next_ready_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .lock()?
            .delayed
            .peek()
            .map(|Reverse(held)| held.job.ready_at))
    }

    async fn stats(&self) -> Result<QueueStats> {
        let inner = self.lock()?;
        Ok(QueueStats {
            ready: inner.ready.len() as u64,
            delayed: inner.delayed.len() as u64,
        })
    }

    async fn wait_ready(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.ready_signal.notified()).await;
    }
}
