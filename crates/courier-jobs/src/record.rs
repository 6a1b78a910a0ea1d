//! Job records and the lifecycle state machine.
//!
//! A [`JobRecord`] is what pollers see. It is created in `PENDING` when a job is
//! submitted and is afterwards only rewritten by the worker that owns the job.

use crate::backend::JobRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Status message of a job no worker has picked up yet
pub const PENDING_STATUS: &str = "Pending...";

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Progress,
    Success,
    Failure,
}

impl JobState {
    /// `SUCCESS` and `FAILURE` are final
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    /// Whether a record in this state may be overwritten by one in `next`.
    ///
    /// `PROGRESS -> PROGRESS` is allowed: every progress tick is a new write.
    pub fn can_transition_to(self, next: JobState) -> bool {
        match self {
            JobState::Pending => true,
            JobState::Progress => next != JobState::Pending,
            JobState::Success | JobState::Failure => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Progress => "PROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress fraction `current / total`, with `total >= 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(current: u64, total: u64) -> Self {
        Self {
            current,
            total: total.max(1),
        }
    }

    /// `(0, 1)`, reported before a worker claims the job
    pub fn pending() -> Self {
        Self::new(0, 1)
    }

    /// `(1, 1)`, a finished attempt without finer-grained progress
    pub fn done() -> Self {
        Self::new(1, 1)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::pending()
    }
}

/// Current state of one submitted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    /// Job type tag the handler was registered under
    pub name: String,
    pub state: JobState,
    pub progress: Progress,
    pub status: String,
    /// Handler output, only set on `SUCCESS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error text, only set on `FAILURE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// The record written when a job is submitted
    pub fn pending(request: &JobRequest) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            state: JobState::Pending,
            progress: Progress::pending(),
            status: PENDING_STATUS.to_string(),
            result: None,
            error: None,
            payload: request.payload.clone(),
            created_at: request.created_at,
            ready_at: request.ready_at,
            updated_at: request.created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// A `PROGRESS` update carrying a new fraction and message
    pub fn advanced(&self, progress: Progress, status: impl Into<String>) -> Self {
        Self {
            state: JobState::Progress,
            progress,
            status: status.into(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// The terminal `SUCCESS` record
    pub fn succeeded(
        &self,
        progress: Progress,
        status: impl Into<String>,
        result: Option<Value>,
    ) -> Self {
        Self {
            state: JobState::Success,
            progress,
            status: status.into(),
            result,
            error: None,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// The terminal `FAILURE` record; progress is reported as `(1, 1)`
    pub fn failed(&self, error: impl fmt::Display) -> Self {
        let error = error.to_string();
        Self {
            state: JobState::Failure,
            progress: Progress::done(),
            status: error.clone(),
            result: None,
            error: Some(error),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Response body of a status query: `{state, current, total, status, result?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub state: JobState,
    pub current: u64,
    pub total: u64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl StatusView {
    /// Synthetic view for a job no worker has touched yet
    pub fn pending() -> Self {
        Self {
            state: JobState::Pending,
            current: 0,
            total: 1,
            status: PENDING_STATUS.to_string(),
            result: None,
        }
    }
}

impl From<&JobRecord> for StatusView {
    fn from(record: &JobRecord) -> Self {
        match record.state {
            JobState::Pending => Self::pending(),
            JobState::Failure => Self {
                state: JobState::Failure,
                current: 1,
                total: 1,
                status: record
                    .error
                    .clone()
                    .unwrap_or_else(|| record.status.clone()),
                result: None,
            },
            state => Self {
                state,
                current: record.progress.current,
                total: record.progress.total,
                status: record.status.clone(),
                result: if state == JobState::Success {
                    record.result.clone()
                } else {
                    None
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> JobRequest {
        let now = Utc::now();
        JobRequest {
            id: "job-1".to_string(),
            name: "long_task".to_string(),
            payload: Value::Null,
            created_at: now,
            ready_at: now,
        }
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        for terminal in [JobState::Success, JobState::Failure] {
            for next in [
                JobState::Pending,
                JobState::Progress,
                JobState::Success,
                JobState::Failure,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(JobState::Progress.can_transition_to(JobState::Progress));
        assert!(!JobState::Progress.can_transition_to(JobState::Pending));
        assert!(JobState::Pending.can_transition_to(JobState::Failure));
    }

    #[test]
    fn progress_total_is_at_least_one() {
        assert_eq!(Progress::new(0, 0).total, 1);
        assert_eq!(Progress::new(3, 7), Progress { current: 3, total: 7 });
    }

    #[test]
    fn state_serializes_in_upper_case() {
        assert_eq!(
            serde_json::to_value(JobState::Progress).unwrap(),
            json!("PROGRESS")
        );
        let state: JobState = serde_json::from_value(json!("FAILURE")).unwrap();
        assert_eq!(state, JobState::Failure);
    }

    #[test]
    fn pending_record_has_no_result() {
        let record = JobRecord::pending(&request());
        assert_eq!(record.state, JobState::Pending);
        assert!(record.result.is_none());
        assert_eq!(StatusView::from(&record), StatusView::pending());
    }

    #[test]
    fn failure_view_reports_error_text_and_full_progress() {
        let record = JobRecord::pending(&request())
            .advanced(Progress::new(4, 20), "Loading fast orbiter...")
            .failed("connection refused");

        let view = StatusView::from(&record);
        assert_eq!(view.state, JobState::Failure);
        assert_eq!((view.current, view.total), (1, 1));
        assert_eq!(view.status, "connection refused");
        assert!(view.result.is_none());
    }

    #[test]
    fn result_is_only_exposed_on_success() {
        let running = JobRecord::pending(&request()).advanced(Progress::new(1, 10), "Booting");
        let view = StatusView::from(&running);
        assert!(view.result.is_none());
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({"state": "PROGRESS", "current": 1, "total": 10, "status": "Booting"})
        );

        let done = running.succeeded(Progress::new(100, 100), "Task completed!", Some(json!(42)));
        assert_eq!(
            serde_json::to_value(StatusView::from(&done)).unwrap(),
            json!({
                "state": "SUCCESS",
                "current": 100,
                "total": 100,
                "status": "Task completed!",
                "result": 42
            })
        );
    }
}
