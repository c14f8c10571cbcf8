//! CompleteOrderHandler - the single authoritative order completion routine.
//!
//! Both reconciliation triggers (provider webhook and the user's
//! return-from-checkout page) funnel into this handler. Correctness rests
//! on two properties:
//!
//! 1. The order row is read under an exclusive lock, so concurrent
//!    completion attempts for the same order serialize.
//! 2. The not-yet-completed check happens under that lock, so repeated or
//!    racing triggers converge on exactly one completion: one enrollment,
//!    one finalized payment, one confirmation email.
//!
//! The confirmation email runs after commit and can never abort or roll
//! back the ledger writes.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Enrollment, Order};
use crate::domain::foundation::{OrderId, Timestamp};
use crate::ports::LedgerStore;

use super::PurchaseNotifier;

/// Command to complete an order.
#[derive(Debug, Clone)]
pub struct CompleteOrderCommand {
    /// Order to complete.
    pub order_id: OrderId,

    /// Provider payment-intent identifier for backfill, when the trigger
    /// carried one.
    pub payment_intent_id: Option<String>,
}

/// Result of a completion attempt.
#[derive(Debug, Clone)]
pub enum CompleteOrderResult {
    /// This call performed the completion.
    Completed { order: Order },

    /// The order had already completed; nothing was changed.
    AlreadyCompleted { order: Order },

    /// No such order; logged no-op (events may reference stale or foreign
    /// order ids and must not error back to the provider).
    NotFound,
}

/// Handler for the completion routine.
pub struct CompleteOrderHandler {
    ledger: Arc<dyn LedgerStore>,
    notifier: Arc<PurchaseNotifier>,
}

impl CompleteOrderHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>, notifier: Arc<PurchaseNotifier>) -> Self {
        Self { ledger, notifier }
    }

    pub async fn handle(
        &self,
        cmd: CompleteOrderCommand,
    ) -> Result<CompleteOrderResult, BillingError> {
        // 1. Exclusive scope over the order row.
        let mut tx = self.ledger.begin().await?;

        let Some(mut order) = tx.find_order_for_update(&cmd.order_id).await? else {
            tracing::warn!(
                order_id = %cmd.order_id,
                "Completion requested for unknown order"
            );
            return Ok(CompleteOrderResult::NotFound);
        };

        // 2. Idempotence check, under the lock.
        if order.is_completed() {
            tracing::debug!(order_id = %order.id, "Order already completed");
            return Ok(CompleteOrderResult::AlreadyCompleted { order });
        }

        let now = Timestamp::now();

        // 3. Order -> Completed. A Failed/Cancelled order refuses here.
        order.complete(now)?;
        tx.update_order(&order).await?;

        // 4. Finalize the linked payment, backfilling the provider intent.
        if let Some(payment_id) = order.payment_id {
            match tx.find_payment(&payment_id).await? {
                Some(mut payment) => {
                    payment.complete(now, cmd.payment_intent_id.as_deref())?;
                    tx.update_payment(&payment).await?;
                }
                None => {
                    // Dangling reference; the order still completes.
                    tracing::error!(
                        order_id = %order.id,
                        payment_id = %payment_id,
                        "Order references a missing payment record"
                    );
                }
            }
        }

        // 5. Grant or re-activate course access.
        let enrollment = match tx
            .find_enrollment(&order.user_id, &order.course_id)
            .await?
        {
            Some(mut existing) => {
                existing.reactivate();
                existing
            }
            None => Enrollment::new(order.user_id, order.course_id, now),
        };
        tx.upsert_enrollment(&enrollment).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            course_id = %order.course_id,
            "Order completed and enrollment activated"
        );

        // 6. Best-effort notification, strictly after commit.
        self.notifier.purchase_confirmed(&order).await;

        Ok(CompleteOrderResult::Completed { order })
    }
}
