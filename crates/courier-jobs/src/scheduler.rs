//! Promotion of delayed jobs into the ready queue.

use crate::backend::JobBackend;
use crate::error::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Background loop that moves due jobs out of the broker's holding area.
///
/// The loop sleeps until the earliest held `ready_at` or for one `tick`,
/// whichever comes first, so a delayed job becomes ready at most one tick late.
pub struct Scheduler {
    backend: Arc<dyn JobBackend>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(backend: Arc<dyn JobBackend>, tick: Duration) -> Self {
        Self { backend, tick }
    }

    /// Promote every held job that is due now
    pub async fn promote_now(&self) -> Result<usize> {
        let promoted = self.backend.promote_due(Utc::now()).await?;
        if promoted > 0 {
            tracing::debug!(promoted, "Promoted delayed jobs");
        }
        Ok(promoted)
    }

    /// Run until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(tick_ms = self.tick.as_millis() as u64, "Scheduler started");

        loop {
            self.promote_now().await?;
            let pause = self.next_pause().await?;

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!("Scheduler stopped");
        Ok(())
    }

    async fn next_pause(&self) -> Result<Duration> {
        let pause = match self.backend.next_ready_at().await? {
            Some(ready_at) => (ready_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.tick),
            None => self.tick,
        };
        Ok(pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::backend::JobRequest;
    use std::time::Instant;

    const POLL: Duration = Duration::from_millis(5);
    const SLACK: Duration = Duration::from_millis(100);

    /// Poll `backend` until a job comes out, returning it with the time it was seen
    async fn pop_when_ready(backend: &InMemoryBackend) -> (JobRequest, chrono::DateTime<Utc>) {
        let started = Instant::now();
        loop {
            if let Some(job) = backend.pop().await.unwrap() {
                return (job, Utc::now());
            }
            assert!(started.elapsed() < Duration::from_secs(5), "job never promoted");
            tokio::time::sleep(POLL).await;
        }
    }

    fn lateness(ready_at: chrono::DateTime<Utc>, seen_at: chrono::DateTime<Utc>) -> Duration {
        (seen_at - ready_at).to_std().unwrap_or(Duration::ZERO)
    }

    fn delayed(id: &str, delay: Duration) -> JobRequest {
        let now = Utc::now();
        JobRequest {
            id: id.to_string(),
            name: "test_job".to_string(),
            payload: serde_json::Value::Null,
            created_at: now,
            ready_at: now + chrono::Duration::from_std(delay).unwrap(),
        }
    }

    #[tokio::test]
    async fn promotes_job_once_ready_at_passes() {
        let tick = Duration::from_millis(20);
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = Scheduler::new(backend.clone(), tick);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let job = delayed("soon", Duration::from_millis(150));
        let ready_at = job.ready_at;
        backend.push(job).await.unwrap();

        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        let (popped, seen_at) = pop_when_ready(&backend).await;
        assert_eq!(popped.id, "soon");
        assert!(seen_at >= ready_at);
        assert!(lateness(ready_at, seen_at) <= tick + POLL + SLACK);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn job_pushed_while_idle_is_at_most_one_tick_late() {
        let tick = Duration::from_millis(200);
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = Scheduler::new(backend.clone(), tick);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // The scheduler is already asleep for a full tick when the job arrives
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let job = delayed("idle", Duration::from_millis(10));
        let ready_at = job.ready_at;
        backend.push(job).await.unwrap();

        let (popped, seen_at) = pop_when_ready(&backend).await;
        assert_eq!(popped.id, "idle");
        assert!(seen_at >= ready_at);
        assert!(lateness(ready_at, seen_at) <= tick + POLL + SLACK);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn promote_now_leaves_future_jobs_held() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = Scheduler::new(backend.clone(), Duration::from_secs(1));

        backend
            .push(delayed("later", Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(scheduler.promote_now().await.unwrap(), 0);
        assert!(backend.pop().await.unwrap().is_none());
        assert_eq!(scheduler.next_pause().await.unwrap(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn stops_when_sender_is_dropped() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = Scheduler::new(backend, Duration::from_millis(10));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
        drop(shutdown_tx);

        handle.await.unwrap().unwrap();
    }
}
