//! Resend implementation of the Mailer port.
//!
//! Sends transactional email through the Resend HTTP API. Callers on the
//! completion path already treat mail failures as non-fatal; this adapter
//! just reports them accurately.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::ports::{EmailMessage, MailError, Mailer};

/// Resend API configuration.
#[derive(Clone)]
pub struct ResendConfig {
    /// Resend API key (re_...).
    api_key: SecretString,

    /// "Name <address>" header value for outgoing mail.
    from: String,

    /// Base URL for the Resend API (default: https://api.resend.com).
    api_base_url: String,
}

impl ResendConfig {
    /// Create a new Resend configuration.
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            from: from.into(),
            api_base_url: "https://api.resend.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Resend mail transport.
pub struct ResendMailer {
    config: ResendConfig,
    http_client: reqwest::Client,
}

impl ResendMailer {
    /// Create a new mailer with the given configuration.
    pub fn new(config: ResendConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if message.to.is_empty() || !message.to.contains('@') {
            return Err(MailError::InvalidMessage(format!(
                "Invalid recipient address: {:?}",
                message.to
            )));
        }

        let url = format!("{}/emails", self.config.api_base_url);
        let body = SendEmailRequest {
            from: &self.config.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html_body,
            text: &message.text_body,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(%status, detail, "Resend rejected the message");
            return Err(MailError::Rejected(format!("{}: {}", status, detail)));
        }

        Ok(())
    }
}
