//! Mailer port for transactional email.
//!
//! The notification dispatcher is best-effort relative to order completion;
//! the port surface is deliberately small: one message, one send, one error.

use async_trait::async_trait;
use thiserror::Error;

/// A transactional email ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,

    /// Subject line.
    pub subject: String,

    /// HTML body.
    pub html_body: String,

    /// Plaintext fallback body.
    pub text_body: String,
}

/// Errors from the mail transport.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Transport-level failure (network, TLS).
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// The mail API rejected the request.
    #[error("Mail provider rejected the message: {0}")]
    Rejected(String),

    /// The message itself was malformed.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Port for sending transactional email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single message, returning once the transport accepted it.
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}
