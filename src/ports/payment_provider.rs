//! Payment provider port for external payment processing.
//!
//! Defines the contract for payment gateway integrations (e.g., Stripe).
//! Implementations handle checkout session management and webhook
//! authentication.
//!
//! # Design
//!
//! - **Gateway agnostic**: Interface works with any one-off-payment provider
//! - **Normalized events**: `verify_webhook` returns the internal
//!   `ProviderEvent` shape, never raw provider JSON
//! - **Fail closed**: verification errors carry no parsed payload

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{ProviderEvent, ProviderPaymentStatus, SessionMetadata};
use crate::domain::foundation::{CourseId, DomainError, ErrorCode, OrderId, UserId};

/// Port for payment provider integrations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session for a course purchase.
    ///
    /// The session must embed order, user, and course identifiers as
    /// metadata; both reconciliation paths re-validate them.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Fetch the authoritative state of a checkout session by id.
    ///
    /// Used by the fallback reconciler; the session's own `payment_status`
    /// and metadata are the only trusted inputs on that path.
    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ProviderSession>, PaymentError>;

    /// Verify a webhook signature and parse the event.
    ///
    /// Returns the normalized event if the signature is valid, error
    /// otherwise. Implementations must not partially parse unverified
    /// payloads into results.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ProviderEvent, PaymentError>;
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Order the session will pay for.
    pub order_id: OrderId,

    /// Purchasing user.
    pub user_id: UserId,

    /// Course being purchased.
    pub course_id: CourseId,

    /// Customer email for checkout prefill.
    pub email: String,

    /// Line item display name.
    pub course_title: String,

    /// Amount in cents.
    pub amount_cents: i64,

    /// ISO 4217 currency code (lowercase for the provider API).
    pub currency: String,

    /// URL to redirect after successful checkout.
    pub success_url: String,

    /// URL to redirect after cancelled checkout.
    pub cancel_url: String,
}

/// Newly created checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID (cs_...).
    pub id: String,

    /// URL for the customer to complete checkout.
    pub url: String,

    /// Payment intent identifier, if the provider assigned one already.
    pub payment_intent_id: Option<String>,

    /// When the session expires (Unix timestamp).
    pub expires_at: i64,
}

/// Authoritative session state fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    /// Provider's session ID.
    pub id: String,

    /// Provider-reported payment state.
    pub payment_status: ProviderPaymentStatus,

    /// Payment intent identifier, once assigned.
    pub payment_intent_id: Option<String>,

    /// Identifiers embedded at session creation.
    pub metadata: SessionMetadata,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(
            PaymentErrorCode::NotFound,
            format!("{} not found", resource),
        )
    }

    /// Create an invalid webhook error.
    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidWebhook, message)
    }

    /// Create a provider API error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::NotFound => ErrorCode::ValidationFailed,
            PaymentErrorCode::InvalidWebhook => ErrorCode::ValidationFailed,
            _ => ErrorCode::ExternalServiceError,
        };

        DomainError::new(code, err.message)
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Resource not found.
    NotFound,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Invalid webhook signature or payload.
    InvalidWebhook,

    /// Provider API error.
    ProviderError,

    /// Unknown error.
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError | PaymentErrorCode::RateLimitExceeded
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::InvalidWebhook => "invalid_webhook",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
