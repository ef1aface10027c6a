//! Outbound mail seam
//!
//! Delivery is not part of this service: [`LogMailer`] records messages in
//! the log, [`MemoryMailer`] keeps them for inspection.

use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("Mail delivery failed: {0}")]
pub struct MailError(pub String);

pub trait Mailer: Send + Sync {
    fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Writes every message to the tracing log
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "Outgoing mail:\n{}", mail.body);
        Ok(())
    }
}

/// Keeps sent messages in memory
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<OutgoingMail> {
        self.sent().pop()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|e| MailError(e.to_string()))?
            .push(mail);
        Ok(())
    }
}

/// Activation message for a new account
pub fn activation_mail(
    application_name: &str,
    public_url: &str,
    to: &str,
    username: &str,
    uid: &str,
    token: &str,
) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: format!("[{}] Activate your {} account", application_name, application_name),
        body: format!(
            "Hi {},\n\nPlease follow the link below to confirm your registration:\n\n{}/api/accounts/activate/{}/{}\n",
            username,
            public_url.trim_end_matches('/'),
            uid,
            token
        ),
    }
}

/// Password reset message
pub fn password_reset_mail(
    application_name: &str,
    public_url: &str,
    to: &str,
    username: &str,
    uid: &str,
    token: &str,
) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: format!("[{}] Password reset", application_name),
        body: format!(
            "Hi {},\n\nA password reset was requested for your account. Submit the values below with \
             your new password to {}/api/accounts/password_reset/confirm\n\n\
             uid: {}\ntoken: {}\n\nIf you did not request this, ignore this message.\n",
            username,
            public_url.trim_end_matches('/'),
            uid,
            token
        ),
    }
}
