//! Billing error types.
//!
//! Application-level outcomes for checkout, webhook, and reconciliation
//! flows, with retryability semantics used by the webhook endpoint to decide
//! whether the provider should redeliver.

use thiserror::Error;

use crate::domain::foundation::{CourseId, DomainError, ErrorCode, OrderId, UserId};

/// Errors produced by the billing application layer.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Referenced order does not exist.
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    /// The requesting user does not own the order.
    #[error("Order {order_id} does not belong to the requesting user")]
    NotOrderOwner { order_id: OrderId, user_id: UserId },

    /// Referenced course does not exist or is not published.
    #[error("Course {0} not found")]
    CourseNotFound(CourseId),

    /// The user already holds an active enrollment for the course.
    #[error("User {user_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled {
        user_id: UserId,
        course_id: CourseId,
    },

    /// Webhook signature could not be verified.
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    /// The payment provider rejected or failed an operation.
    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    /// A state transition was attempted that the lifecycle forbids.
    #[error("Invalid state: cannot {action} while {state}")]
    InvalidState { state: String, action: String },

    /// Request input failed validation.
    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    /// Persistence or other infrastructure failure.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl BillingError {
    /// Create a not-owner error.
    pub fn not_order_owner(order_id: OrderId, user_id: UserId) -> Self {
        Self::NotOrderOwner { order_id, user_id }
    }

    /// Create an already-enrolled error.
    pub fn already_enrolled(user_id: UserId, course_id: CourseId) -> Self {
        Self::AlreadyEnrolled { user_id, course_id }
    }

    /// Create a provider error.
    pub fn payment_provider(message: impl Into<String>) -> Self {
        Self::PaymentProvider(message.into())
    }

    /// Create an invalid-state error.
    pub fn invalid_state(state: impl Into<String>, action: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
            action: action.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an infrastructure error.
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure(message.into())
    }

    /// Returns true if the provider should redeliver the triggering webhook.
    ///
    /// Only infrastructure failures qualify; everything else would fail the
    /// same way on redelivery and must be acknowledged to avoid retry storms.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Infrastructure(_))
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::DatabaseError
            | ErrorCode::ExternalServiceError
            | ErrorCode::InternalError => BillingError::Infrastructure(err.to_string()),
            ErrorCode::InvalidStateTransition => BillingError::InvalidState {
                state: err.message.clone(),
                action: "transition".to_string(),
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}
