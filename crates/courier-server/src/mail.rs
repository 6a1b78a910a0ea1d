//! Mail transports: SMTP delivery and a log-only fallback for development.

use crate::config::Settings;
use async_trait::async_trait;
use courier_jobs::jobs::{EmailData, MailError, MailTransport};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

/// SMTP delivery over STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        sender: &str,
    ) -> Result<Self, MailError> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {}", sender, e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(port);

        if let Some((user, pass)) = credentials {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, email: &EmailData) -> Result<Message, MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {}", email.to, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, email: &EmailData) -> Result<(), MailError> {
        let message = self.message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        tracing::debug!(to = %email.to, "Delivered over SMTP");
        Ok(())
    }
}

/// Writes mail to the log instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn deliver(&self, email: &EmailData) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body_len = email.body.len(),
            "SMTP_HOST not set, mail logged instead of sent"
        );
        Ok(())
    }
}

/// SMTP when `SMTP_HOST` is set, the log otherwise
pub fn transport_from_settings(settings: &Settings) -> Result<Arc<dyn MailTransport>, MailError> {
    match &settings.smtp_host {
        Some(host) => {
            let credentials = settings
                .smtp_username
                .clone()
                .zip(settings.smtp_password.clone());
            tracing::info!(host = %host, port = settings.smtp_port, "Using SMTP mail transport");
            Ok(Arc::new(SmtpMailer::new(
                host,
                settings.smtp_port,
                credentials,
                &settings.mail_default_sender,
            )?))
        }
        None => Ok(Arc::new(LogMailer)),
    }
}
