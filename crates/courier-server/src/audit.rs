//! Postgres audit log of sent emails.

use async_trait::async_trait;
use courier_jobs::jobs::{AuditError, AuditLog, EmailData};
use sqlx::postgres::{PgPool, PgPoolOptions};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS email_records (
    id SERIAL PRIMARY KEY,
    email VARCHAR(120) NOT NULL,
    subject VARCHAR(200) NOT NULL,
    body TEXT NOT NULL,
    sent_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// One row per notification, written before the mail goes out.
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Create `email_records` if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn record(&self, email: &EmailData) -> Result<(), AuditError> {
        sqlx::query("INSERT INTO email_records (email, subject, body) VALUES ($1, $2, $3)")
            .bind(&email.to)
            .bind(&email.subject)
            .bind(&email.body)
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(())
    }
}
