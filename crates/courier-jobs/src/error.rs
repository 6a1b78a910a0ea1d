use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The payload was rejected before it reached the broker
    #[error("Invalid job submission: {0}")]
    Submission(String),

    /// Field-level validation of the payload failed
    #[error("Invalid job payload: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Status store error: {0}")]
    Store(String),

    /// Raised by a handler while executing a job
    #[error("{0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl JobError {
    /// Create a handler failure from anything printable
    pub fn handler(err: impl std::fmt::Display) -> Self {
        JobError::Handler(err.to_string())
    }

    /// Whether the error comes from the queue/store infrastructure rather than a job
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, JobError::Backend(_) | JobError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
