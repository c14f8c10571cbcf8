//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    checkout_return, create_checkout, handle_stripe_webhook, payment_history, BillingAppState,
};

/// Create the checkout/payments API router.
///
/// # Routes
///
/// ## User Endpoints (require authentication)
/// - `POST /checkout` - Start a paid course purchase
/// - `GET /checkout/return` - Checkout return page reconciliation
/// - `GET /payments/history` - Purchase history
pub fn checkout_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/checkout/return", get(checkout_return))
        .route("/payments/history", get(payment_history))
}

/// Create the provider webhook router.
///
/// Separate from the user routes because webhooks carry no user
/// authentication; they are verified via signature instead.
///
/// # Routes
/// - `POST /stripe` - Handle Stripe webhooks
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Create the complete billing module router.
///
/// Suitable for mounting at `/api`:
///
/// ```ignore
/// let app = Router::new()
///     .merge(billing_router())
///     .with_state(app_state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .merge(checkout_routes())
        .nest("/webhooks", webhook_routes())
}
