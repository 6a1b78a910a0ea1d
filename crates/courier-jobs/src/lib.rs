//! Background job execution for Courier
//!
//! Jobs are submitted to a [`JobQueue`], handed over through a broker
//! ([`JobBackend`]), executed by a worker pool and observed by polling the
//! [`StatusStore`]. Delayed jobs wait in the broker's holding area until the
//! [`Scheduler`] promotes them.

pub mod backend;
pub mod engine;
pub mod error;
pub mod job;
pub mod jobs;
pub mod progress;
pub mod queue;
pub mod record;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use backend::memory::InMemoryBackend;
pub use backend::{JobBackend, JobRequest, QueueStats};
pub use engine::{EngineConfig, EngineHandle};
pub use error::{JobError, Result};
pub use job::{Completion, Job, JobContext, JobHandler};
pub use progress::ProgressReporter;
pub use queue::{JobQueue, SubmitOptions};
pub use record::{JobRecord, JobState, Progress, StatusView};
pub use scheduler::Scheduler;
pub use store::memory::InMemoryStatusStore;
pub use store::StatusStore;
pub use worker::{WorkerConfig, WorkerPool, WorkerPoolHandle};

#[cfg(feature = "redis")]
pub use backend::redis::RedisBackend;
#[cfg(feature = "redis")]
pub use store::redis::RedisStatusStore;
