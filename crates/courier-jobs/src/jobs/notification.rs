//! Email notification job: record the email in the audit log, then send it.

use crate::error::{JobError, Result};
use crate::job::{Completion, Job, JobContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use validator::Validate;

/// Input of a notification job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EmailData {
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(email, length(max = 120))]
    pub to: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("could not build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Durable record of sent emails, written once per notification
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, email: &EmailData) -> std::result::Result<(), AuditError>;
}

/// Outbound mail delivery
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &EmailData) -> std::result::Result<(), MailError>;
}

/// Sends one email.
///
/// The audit write happens first; if it fails no mail is sent. If delivery
/// fails the audit row stays. Either failure marks the job `FAILURE` and the
/// error text names the step that failed.
#[derive(Clone)]
pub struct NotificationJob {
    audit: Arc<dyn AuditLog>,
    transport: Arc<dyn MailTransport>,
}

impl NotificationJob {
    pub const TASK_NAME: &'static str = "send_async_email";

    pub fn new(audit: Arc<dyn AuditLog>, transport: Arc<dyn MailTransport>) -> Self {
        Self { audit, transport }
    }
}

#[async_trait]
impl Job for NotificationJob {
    const NAME: &'static str = Self::TASK_NAME;
    type Data = EmailData;

    fn validate(&self, data: &Self::Data) -> Result<()> {
        Validate::validate(data)?;
        Ok(())
    }

    async fn execute(&self, ctx: JobContext, data: Self::Data) -> Result<Completion> {
        self.audit
            .record(&data)
            .await
            .map_err(|e| JobError::Handler(format!("audit record write failed: {}", e)))?;

        self.transport
            .deliver(&data)
            .await
            .map_err(|e| JobError::Handler(format!("mail delivery failed: {}", e)))?;

        tracing::info!(job_id = %ctx.job_id, to = %data.to, "Email sent");
        Ok(Completion::empty().with_status(format!("Email sent to {}", data.to)))
    }
}

/// One row of the in-memory audit log
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub email: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Audit log kept in process memory (not persistent, for testing/dev)
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, email: &EmailData) -> std::result::Result<(), AuditError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuditError::Storage("Lock poisoned".to_string()))?;
        entries.push(AuditEntry {
            email: email.to.clone(),
            subject: email.subject.clone(),
            body: email.body.clone(),
            sent_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::queue::JobQueue;
    use crate::record::{JobState, StatusView};
    use crate::store::memory::InMemoryStatusStore;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<EmailData>>,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for Outbox {
        async fn deliver(&self, email: &EmailData) -> std::result::Result<(), MailError> {
            if self.fail {
                return Err(MailError::Transport("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct BrokenAudit;

    #[async_trait]
    impl AuditLog for BrokenAudit {
        async fn record(&self, _email: &EmailData) -> std::result::Result<(), AuditError> {
            Err(AuditError::Storage("database is down".to_string()))
        }
    }

    fn email() -> EmailData {
        EmailData {
            subject: "Hi".to_string(),
            to: "a@b.com".to_string(),
            body: "test".to_string(),
        }
    }

    async fn queue_with(audit: Arc<dyn AuditLog>, outbox: Arc<Outbox>) -> JobQueue {
        let queue = JobQueue::new(InMemoryBackend::new(), InMemoryStatusStore::new());
        queue
            .register_job(NotificationJob::new(audit, outbox))
            .await;
        queue
    }

    #[tokio::test]
    async fn sends_once_and_records_audit_entry() {
        let audit = InMemoryAuditLog::new();
        let outbox = Arc::new(Outbox::default());
        let queue = queue_with(Arc::new(audit.clone()), outbox.clone()).await;

        let id = queue.submit::<NotificationJob>(email()).await.unwrap();
        assert_eq!(queue.status(&id).await.unwrap(), StatusView::pending());

        assert!(queue.process_one().await.unwrap());

        let view = queue.status(&id).await.unwrap();
        assert_eq!(view.state, JobState::Success);
        assert_eq!((view.current, view.total), (1, 1));
        assert_eq!(view.status, "Email sent to a@b.com");
        assert!(view.result.is_none());

        assert_eq!(outbox.sent.lock().unwrap().as_slice(), &[email()]);
        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].email, "a@b.com");
        assert_eq!(entries[0].subject, "Hi");
        assert_eq!(entries[0].body, "test");
    }

    #[tokio::test]
    async fn delivery_failure_keeps_audit_entry() {
        let audit = InMemoryAuditLog::new();
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Outbox::default()
        });
        let queue = queue_with(Arc::new(audit.clone()), outbox).await;

        let id = queue.submit::<NotificationJob>(email()).await.unwrap();
        assert!(queue.process_one().await.unwrap());

        let view = queue.status(&id).await.unwrap();
        assert_eq!(view.state, JobState::Failure);
        assert_eq!(
            view.status,
            "mail delivery failed: transport error: connection refused"
        );
        assert_eq!(audit.entries().len(), 1);
    }

    #[tokio::test]
    async fn audit_failure_skips_delivery() {
        let outbox = Arc::new(Outbox::default());
        let queue = queue_with(Arc::new(BrokenAudit), outbox.clone()).await;

        let id = queue.submit::<NotificationJob>(email()).await.unwrap();
        assert!(queue.process_one().await.unwrap());

        let view = queue.status(&id).await.unwrap();
        assert_eq!(view.state, JobState::Failure);
        assert!(view.status.starts_with("audit record write failed"));
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_address_is_rejected_at_submission() {
        let queue = queue_with(
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(Outbox::default()),
        )
        .await;

        let err = queue
            .submit::<NotificationJob>(EmailData {
                to: "not-an-address".to_string(),
                ..email()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
    }
}
