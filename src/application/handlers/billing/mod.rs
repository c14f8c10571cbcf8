//! Billing handlers - checkout, reconciliation, and notifications.
//!
//! `CompleteOrderHandler` is the single authoritative completion routine;
//! the webhook router and the return-page reconciler both call into it
//! rather than duplicating the state transition.

mod complete_order;
mod create_checkout;
mod handle_payment_webhook;
mod notify_purchase;
mod payment_history;
mod reconcile_return;

pub use complete_order::{CompleteOrderCommand, CompleteOrderHandler, CompleteOrderResult};
pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use handle_payment_webhook::{
    HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, HandlePaymentWebhookResult,
};
pub use notify_purchase::PurchaseNotifier;
pub use payment_history::{GetPaymentHistoryHandler, GetPaymentHistoryQuery, PaymentHistory};
pub use reconcile_return::{ReconcileReturnCommand, ReconcileReturnHandler, ReturnView};
