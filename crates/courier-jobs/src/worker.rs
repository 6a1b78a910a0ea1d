//! Worker pool: independent loops claiming ready jobs from one shared queue.

use crate::error::{JobError, Result};
use crate::queue::JobQueue;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs executed concurrently
    pub concurrency: usize,
    /// Upper bound on how long an idle worker waits before polling again
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct WorkerPool {
    queue: JobQueue,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(queue: JobQueue, config: WorkerConfig) -> Self {
        Self { queue, config }
    }

    /// Start `concurrency` workers; they stop once `shutdown` turns true,
    /// after finishing the job in hand.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> WorkerPoolHandle {
        let mut tasks = JoinSet::new();
        for worker in 0..self.config.concurrency.max(1) {
            tasks.spawn(run_worker(
                worker,
                self.queue.clone(),
                self.config.poll_interval,
                shutdown.clone(),
            ));
        }

        tracing::info!(
            concurrency = self.config.concurrency.max(1),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Worker pool started"
        );
        WorkerPoolHandle { tasks }
    }
}

/// Running workers
pub struct WorkerPoolHandle {
    tasks: JoinSet<Result<()>>,
}

impl WorkerPoolHandle {
    /// Wait for workers to stop.
    ///
    /// Returns early with the first worker error; the remaining workers keep
    /// running until shutdown is signalled.
    pub async fn join(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            joined.map_err(|e| JobError::Backend(format!("worker task failed: {}", e)))??;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

async fn run_worker(
    worker: usize,
    queue: JobQueue,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    tracing::debug!(worker, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.process_one().await {
            Ok(true) => {}
            Ok(false) => {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = queue.wait_ready(poll_interval) => {}
                }
            }
            Err(e) => {
                tracing::error!(worker, error = %e, "Worker stopped on infrastructure error");
                return Err(e);
            }
        }
    }

    tracing::debug!(worker, "Worker stopped");
    Ok(())
}
