//! Outbound account mail.
//!
//! `SmtpMailer` relays through the server named by `KIANGOMBE_MAIL_SERVER`.
//! Without one the server falls back to `LogMailer`, which hands each
//! message to `tracing`. Delivery failures are logged and never fail the
//! request that triggered them.

use std::sync::Mutex;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
    #[error("Invalid mail address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("SMTP setup failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log.
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl Mailer for LogMailer {
    fn send(&self, message: MailMessage) -> Result<(), MailError> {
        tracing::info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            "Outbound mail"
        );
        tracing::debug!(body = %message.body, "Outbound mail body");
        Ok(())
    }
}

/// Relays messages over SMTP, upgrading with STARTTLS unless disabled.
///
/// `send` queues the message on the current tokio runtime and returns;
/// relay errors surface in the log.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, MailError> {
        let from = parse_mailbox(from)?;
        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
        };
        builder = builder.port(config.port);
        if let Some(username) = &config.username {
            let password = config.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }
        Ok(Self {
            from,
            transport: builder.build(),
        })
    }

    fn build(&self, message: &MailMessage) -> Result<Message, MailError> {
        Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| MailError::Delivery(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let email = self.build(&message)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| MailError::Delivery("no async runtime to relay mail".into()))?;
        let transport = self.transport.clone();
        let MailMessage { to, subject, .. } = message;
        runtime.spawn(async move {
            match transport.send(email).await {
                Ok(_) => tracing::info!(to = %to, subject = %subject, "Mail relayed"),
                Err(e) => tracing::error!(to = %to, error = %e, "SMTP relay failed"),
            }
        });
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Keeps every message in memory. Used by tests to read back links and codes.
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Most recent message sent to `to`.
    pub fn last_to(&self, to: &str) -> Option<MailMessage> {
        self.messages().into_iter().rev().find(|m| m.to == to)
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::Delivery("outbox lock poisoned".into()))?
            .push(message);
        Ok(())
    }
}

// ── Templates ───────────────────────────────────────────

pub fn verification_email(to: &str, full_name: &str, frontend_url: &str, token: &str, code: &str) -> MailMessage {
    let link = format!("{frontend_url}/verify-email?token={token}");
    MailMessage {
        to: to.to_string(),
        subject: "Verify Your Kiangombe Health Account".into(),
        body: format!(
            "Welcome to Kiangombe Health, {full_name}!\n\n\
             Confirm your account by opening this link:\n{link}\n\n\
             Or enter this verification code: {code}\n\n\
             The link expires in 24 hours and the code in 15 minutes.\n\
             If you didn't create an account, ignore this email.\n\n\
             Kiangombe Health Team"
        ),
    }
}

pub fn password_reset_email(to: &str, full_name: &str, frontend_url: &str, token: &str, code: &str) -> MailMessage {
    let link = format!("{frontend_url}/reset-password?token={token}");
    MailMessage {
        to: to.to_string(),
        subject: "Password Reset Request - Kiangombe Health".into(),
        body: format!(
            "Hi {full_name},\n\n\
             You requested to reset your password. Open this link:\n{link}\n\n\
             Or use this reset code: {code}\n\n\
             The link expires in 1 hour and the code in 15 minutes.\n\
             If you didn't request this, ignore this email.\n\n\
             Kiangombe Health Team"
        ),
    }
}

pub fn welcome_email(to: &str, full_name: &str, frontend_url: &str) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "Welcome to Kiangombe Health!".into(),
        body: format!(
            "Hi {full_name},\n\n\
             Your account is ready. Sign in at {frontend_url}/login\n\n\
             Kiangombe Health Team"
        ),
    }
}

/// Send and log failures; mail never fails the caller.
pub fn deliver(mailer: &dyn Mailer, message: MailMessage) {
    let to = message.to.clone();
    if let Err(e) = mailer.send(message) {
        tracing::error!(to = %to, error = %e, "Failed to send mail");
    }
}
