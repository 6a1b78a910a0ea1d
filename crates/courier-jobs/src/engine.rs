//! Wiring of scheduler and worker pool around one [`JobQueue`].

use crate::error::{JobError, Result};
use crate::queue::JobQueue;
use crate::scheduler::Scheduler;
use crate::worker::{WorkerConfig, WorkerPool, WorkerPoolHandle};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers: WorkerConfig,
    /// Upper bound on how late a delayed job is promoted
    pub scheduler_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: WorkerConfig::default(),
            scheduler_tick: Duration::from_millis(250),
        }
    }
}

/// Start the scheduler and the worker pool for `queue`
pub fn start(queue: &JobQueue, config: EngineConfig) -> EngineHandle {
    let (shutdown, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(queue.backend(), config.scheduler_tick);
    let scheduler_rx = shutdown_rx.clone();
    let scheduler = tokio::spawn(async move { scheduler.run(scheduler_rx).await });

    let workers = WorkerPool::new(queue.clone(), config.workers).spawn(shutdown_rx);

    EngineHandle {
        shutdown,
        scheduler: Some(scheduler),
        workers,
    }
}

/// Running scheduler and workers
pub struct EngineHandle {
    shutdown: watch::Sender<bool>,
    scheduler: Option<JoinHandle<Result<()>>>,
    workers: WorkerPoolHandle,
}

impl EngineHandle {
    /// Resolve once the scheduler or a worker fails.
    ///
    /// Never resolves while both are healthy; meant for `select!` next to the
    /// process's other long-running futures.
    pub async fn failed(&mut self) -> JobError {
        let EngineHandle {
            scheduler, workers, ..
        } = self;

        let scheduler_failed = async {
            let Some(handle) = scheduler.as_mut() else {
                return std::future::pending::<JobError>().await;
            };
            let joined = handle.await;
            *scheduler = None;
            match joined {
                Ok(Ok(())) => std::future::pending::<JobError>().await,
                Ok(Err(e)) => e,
                Err(e) => JobError::Backend(format!("scheduler task failed: {}", e)),
            }
        };

        tokio::select! {
            err = scheduler_failed => err,
            joined = workers.join() => match joined {
                Ok(()) => std::future::pending::<JobError>().await,
                Err(e) => e,
            },
        }
    }

    /// Signal shutdown and wait for in-flight jobs to finish
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!("Stopping job engine");
        let _ = self.shutdown.send(true);

        if let Some(scheduler) = self.scheduler.take() {
            scheduler
                .await
                .map_err(|e| JobError::Backend(format!("scheduler task failed: {}", e)))??;
        }
        self.workers.join().await?;

        tracing::info!("Job engine stopped");
        Ok(())
    }
}
