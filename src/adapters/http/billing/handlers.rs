//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query
//! handlers. The webhook endpoint has its own response policy: signature
//! and parse failures answer 400, transient failures answer 5xx so the
//! provider redelivers, and everything else is acknowledged with 200.

use std::sync::Arc;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    CompleteOrderHandler, CreateCheckoutCommand, CreateCheckoutHandler,
    GetPaymentHistoryHandler, GetPaymentHistoryQuery, HandlePaymentWebhookCommand,
    HandlePaymentWebhookHandler, PurchaseNotifier, ReconcileReturnCommand,
    ReconcileReturnHandler, ReturnView,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{CourseCatalog, LedgerReader, LedgerStore, PaymentProvider};

use super::dto::{
    CheckoutResponseDto, CheckoutReturnQuery, CheckoutReturnResponseDto,
    CreateCheckoutRequestDto, ErrorResponse, OrderDto, PaymentDto, PaymentHistoryResponseDto,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all billing dependencies.
///
/// Cloned per request; dependencies are Arc-wrapped for cheap sharing.
#[derive(Clone)]
pub struct BillingAppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub ledger_reader: Arc<dyn LedgerReader>,
    pub catalog: Arc<dyn CourseCatalog>,
    pub payment_provider: Arc<dyn PaymentProvider>,
    pub notifier: Arc<PurchaseNotifier>,
    /// Currency used for new checkouts.
    pub currency: String,
    /// Whether the return page may trigger completion (feature flag).
    pub reconcile_enabled: bool,
}

impl BillingAppState {
    fn completion_handler(&self) -> Arc<CompleteOrderHandler> {
        Arc::new(CompleteOrderHandler::new(
            self.ledger.clone(),
            self.notifier.clone(),
        ))
    }

    pub fn create_checkout_handler(&self) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            self.ledger.clone(),
            self.catalog.clone(),
            self.payment_provider.clone(),
            self.currency.clone(),
        )
    }

    pub fn reconcile_return_handler(&self) -> ReconcileReturnHandler {
        ReconcileReturnHandler::new(
            self.ledger.clone(),
            self.payment_provider.clone(),
            self.completion_handler(),
            self.reconcile_enabled,
        )
    }

    pub fn webhook_handler(&self) -> HandlePaymentWebhookHandler {
        HandlePaymentWebhookHandler::new(
            self.payment_provider.clone(),
            self.ledger.clone(),
            self.completion_handler(),
        )
    }

    pub fn payment_history_handler(&self) -> GetPaymentHistoryHandler {
        GetPaymentHistoryHandler::new(self.ledger_reader.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context (would come from auth middleware in production)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
///
/// In production this would be extracted from a JWT/session by auth
/// middleware; for development an `X-User-Id` header carries the user id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<UserId>().ok())
                .ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser { user_id })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/checkout - Start a paid course purchase
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateCheckoutRequestDto>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.create_checkout_handler();
    let result = handler
        .handle(CreateCheckoutCommand {
            user_id: user.user_id,
            course_id: request.course_id,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
        })
        .await?;

    let response = CheckoutResponseDto {
        order_id: result.order_id,
        checkout_url: result.checkout_url,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/checkout/return - Reconcile and render the checkout return page
pub async fn checkout_return(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Query(query): Query<CheckoutReturnQuery>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.reconcile_return_handler();
    let view = handler
        .handle(ReconcileReturnCommand {
            order_id: query.order_id,
            user_id: user.user_id,
            session_id: query.session_id,
        })
        .await?;

    let response = match view {
        ReturnView::Completed { order } => CheckoutReturnResponseDto {
            state: "completed",
            order: Some(OrderDto::from(order)),
        },
        ReturnView::Processing => CheckoutReturnResponseDto {
            state: "processing",
            order: None,
        },
    };

    Ok(Json(response))
}

/// GET /api/payments/history - The requesting user's orders and payments
pub async fn payment_history(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.payment_history_handler();
    let history = handler
        .handle(GetPaymentHistoryQuery {
            user_id: user.user_id,
        })
        .await?;

    let response = PaymentHistoryResponseDto {
        orders: history.orders.into_iter().map(OrderDto::from).collect(),
        payments: history.payments.into_iter().map(PaymentDto::from).collect(),
    };

    Ok(Json(response))
}

/// POST /api/webhooks/stripe - Handle payment provider webhook events
///
/// Response codes drive provider retry behavior: 200 acknowledges
/// (including no-op cases), 400 means the request never authenticated (no
/// state was touched), 5xx asks for redelivery.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> axum::response::Response {
    let Some(signature) = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
    else {
        let error = ErrorResponse::new("MISSING_SIGNATURE", "Missing Stripe-Signature header");
        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
    };

    let handler = state.webhook_handler();
    let result = handler
        .handle(HandlePaymentWebhookCommand {
            payload: body.to_vec(),
            signature: signature.to_string(),
        })
        .await;

    match result {
        Ok(_) => StatusCode::OK.into_response(),
        Err(BillingError::InvalidWebhookSignature) => {
            let error = ErrorResponse::new("INVALID_SIGNATURE", "Webhook verification failed");
            (StatusCode::BAD_REQUEST, Json(error)).into_response()
        }
        Err(e) if e.is_retryable() => {
            tracing::error!(error = %e, "Webhook handling failed transiently");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            // Redelivery would fail identically; acknowledge and move on.
            tracing::error!(error = %e, "Webhook handling failed non-retryably");
            StatusCode::OK.into_response()
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = match &self.0 {
            // Ownership mismatches answer as not-found so probing other
            // users' order ids confirms nothing.
            BillingError::OrderNotFound(_) | BillingError::NotOrderOwner { .. } => {
                (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND")
            }
            BillingError::CourseNotFound(_) => (StatusCode::NOT_FOUND, "COURSE_NOT_FOUND"),
            BillingError::AlreadyEnrolled { .. } => (StatusCode::CONFLICT, "ALREADY_ENROLLED"),
            BillingError::InvalidWebhookSignature => {
                (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE")
            }
            BillingError::PaymentProvider(_) => (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR"),
            BillingError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
            BillingError::ValidationFailed { .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED")
            }
            BillingError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = match &self.0 {
            // No internal detail leaks to the client.
            BillingError::Infrastructure(_) => "Something went wrong, please try again".to_string(),
            BillingError::NotOrderOwner { order_id, .. } => {
                format!("Order {} not found", order_id)
            }
            other => other.to_string(),
        };

        let body = ErrorResponse::new(error_code, message);
        (status, Json(body)).into_response()
    }
}
