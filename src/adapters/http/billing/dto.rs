//! Request and response DTOs for the billing endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::billing::{Order, OrderStatus, Payment, PaymentStatus};
use crate::domain::foundation::{CourseId, OrderId, Timestamp};

/// POST /api/checkout request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequestDto {
    /// Course to purchase.
    pub course_id: CourseId,

    /// Redirect target after successful payment.
    pub success_url: String,

    /// Redirect target after cancellation.
    pub cancel_url: String,
}

/// POST /api/checkout response body.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponseDto {
    /// The newly created order.
    pub order_id: OrderId,

    /// Provider URL the client must redirect to.
    pub checkout_url: String,
}

/// GET /api/checkout/return query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutReturnQuery {
    /// Order being reconciled.
    pub order_id: OrderId,

    /// Provider session id, present only on return from the provider.
    pub session_id: Option<String>,
}

/// GET /api/checkout/return response body.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReturnResponseDto {
    /// "completed" or "processing".
    pub state: &'static str,

    /// The order, when completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderDto>,
}

/// Order representation exposed over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDto {
    pub id: OrderId,
    pub course_id: CourseId,
    pub amount_cents: i64,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<Order> for OrderDto {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            course_id: order.course_id,
            amount_cents: order.amount_cents,
            status: order.status,
            created_at: order.created_at,
            completed_at: order.completed_at,
        }
    }
}

/// Payment representation exposed over HTTP.
///
/// Provider identifiers stay internal; clients only see the transaction
/// outcome.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentDto {
    pub course_id: CourseId,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<Payment> for PaymentDto {
    fn from(payment: Payment) -> Self {
        Self {
            course_id: payment.course_id,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            status: payment.status,
            created_at: payment.created_at,
            completed_at: payment.completed_at,
        }
    }
}

/// GET /api/payments/history response body.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryResponseDto {
    pub orders: Vec<OrderDto>,
    pub payments: Vec<PaymentDto>,
}

/// Error body returned for all failed requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Code/message pair; no internal detail is exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
