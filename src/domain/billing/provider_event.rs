//! Normalized payment-provider event.
//!
//! The provider SDK delivers dynamically-shaped payloads; adapters parse
//! provider-specific shapes at the boundary into this single internal event
//! type so routing and reconciliation never touch raw JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::{CourseId, OrderId, UserId};

/// Provider event kinds the platform reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventKind {
    /// Checkout session completed.
    CheckoutCompleted,

    /// Payment intent succeeded (backstop when the checkout event is missed).
    PaymentSucceeded,

    /// Payment intent definitively failed.
    PaymentFailed,

    /// Anything else: acknowledged, ignored.
    Unknown(String),
}

impl ProviderEventKind {
    /// Parse a provider event type string.
    pub fn from_event_type(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutCompleted,
            "payment_intent.succeeded" => Self::PaymentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentFailed,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The provider's event type string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::PaymentSucceeded => "payment_intent.succeeded",
            Self::PaymentFailed => "payment_intent.payment_failed",
            Self::Unknown(s) => s,
        }
    }
}

/// Provider-reported payment state of a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPaymentStatus {
    /// Funds captured.
    Paid,

    /// Awaiting payment (async methods, abandoned sessions).
    Unpaid,

    /// Zero-amount session, nothing to capture.
    NoPaymentRequired,

    /// Unrecognized status string.
    Unknown,
}

impl ProviderPaymentStatus {
    /// Parse the provider's `payment_status` string.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "paid" => Self::Paid,
            "unpaid" => Self::Unpaid,
            "no_payment_required" => Self::NoPaymentRequired,
            _ => Self::Unknown,
        }
    }

    /// Returns true when the session state justifies fulfilling the order.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid | Self::NoPaymentRequired)
    }
}

/// Identifiers embedded in checkout-session metadata at session creation.
///
/// These three fields are load-bearing for security: both the webhook and
/// the fallback path re-validate them before completing an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Order the session pays for.
    pub order_id: Option<OrderId>,

    /// User who started the checkout.
    pub user_id: Option<UserId>,

    /// Course being purchased.
    pub course_id: Option<CourseId>,
}

impl SessionMetadata {
    /// Extract known identifiers from a provider metadata map.
    ///
    /// Malformed values are treated as absent; the caller decides whether a
    /// missing identifier is fatal.
    pub fn from_map(metadata: &HashMap<String, String>) -> Self {
        Self {
            order_id: metadata.get("order_id").and_then(|s| s.parse().ok()),
            user_id: metadata.get("user_id").and_then(|s| s.parse().ok()),
            course_id: metadata.get("course_id").and_then(|s| s.parse().ok()),
        }
    }
}

/// Normalized provider event.
///
/// One flat shape for every event kind; fields irrelevant to a given kind
/// are simply `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// Provider event identifier (evt_...).
    pub id: String,

    /// Discriminated event kind.
    pub kind: ProviderEventKind,

    /// Order id from session metadata, when present.
    pub order_id: Option<OrderId>,

    /// User id from session metadata, when present.
    pub user_id: Option<UserId>,

    /// Course id from session metadata, when present.
    pub course_id: Option<CourseId>,

    /// Session payment status, for checkout events.
    pub payment_status: Option<ProviderPaymentStatus>,

    /// Payment intent identifier (pi_...), when present.
    pub payment_intent_id: Option<String>,

    /// Unix timestamp the provider created the event.
    pub created_at: i64,
}

impl ProviderEvent {
    /// Copy the session metadata identifiers into the event.
    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.order_id = metadata.order_id;
        self.user_id = metadata.user_id;
        self.course_id = metadata.course_id;
        self
    }
}
