//! Built-in job types.

pub mod notification;
pub mod simulation;

pub use notification::{
    AuditError, AuditLog, EmailData, InMemoryAuditLog, MailError, MailTransport, NotificationJob,
};
pub use simulation::ProgressSimulationJob;
