//! Order aggregate entity.
//!
//! An Order is the purchase intent for one (user, course) pair. It is the
//! unit of contention for payment reconciliation: completion must happen at
//! most once regardless of how many triggers race for it.
//!
//! # Design Decisions
//!
//! - **Money in cents**: All monetary values stored as i64 cents (not floats)
//! - **Financial record**: Orders are never deleted, only transitioned
//! - **Terminal states**: Completed, Cancelled, and Failed are final

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    CourseId, DomainError, ErrorCode, OrderId, PaymentId, StateMachine, Timestamp, UserId,
};

/// Order purchase lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting payment confirmation from the provider.
    Pending,

    /// Payment submitted, confirmation in flight.
    Processing,

    /// Paid and fulfilled. Terminal.
    Completed,

    /// Abandoned or cancelled before payment. Terminal.
    Cancelled,

    /// Payment definitively failed. Terminal.
    Failed,
}

impl StateMachine for OrderStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Cancelled)
                | (Processing, Failed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use OrderStatus::*;
        match self {
            Pending => vec![Processing, Completed, Cancelled, Failed],
            Processing => vec![Completed, Cancelled, Failed],
            Completed => vec![],
            Cancelled => vec![],
            Failed => vec![],
        }
    }
}

/// Order aggregate - a purchase intent for one user/course/amount.
///
/// # Invariants
///
/// - `id` is globally unique and unguessable (random UUID)
/// - `completed_at` is set if and only if `status == Completed`
/// - `Completed` is reached at most once; all terminal states are final
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier for this order.
    pub id: OrderId,

    /// User who placed the order.
    pub user_id: UserId,

    /// Course being purchased.
    pub course_id: CourseId,

    /// Total amount in cents.
    pub amount_cents: i64,

    /// Current status in the purchase lifecycle.
    pub status: OrderStatus,

    /// The authoritative payment record for this order (one-to-one).
    pub payment_id: Option<PaymentId>,

    /// When the order was created.
    pub created_at: Timestamp,

    /// When the order was last updated.
    pub updated_at: Timestamp,

    /// When the order completed, if it did.
    pub completed_at: Option<Timestamp>,
}

impl Order {
    /// Create a new pending order at checkout-session creation.
    pub fn new(user_id: UserId, course_id: CourseId, amount_cents: i64) -> Self {
        let now = Timestamp::now();
        Self {
            id: OrderId::new(),
            user_id,
            course_id,
            amount_cents,
            status: OrderStatus::Pending,
            payment_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Link the payment record created alongside the checkout session.
    pub fn attach_payment(&mut self, payment_id: PaymentId) {
        self.payment_id = Some(payment_id);
        self.updated_at = Timestamp::now();
    }

    /// Returns true once the order has completed.
    pub fn is_completed(&self) -> bool {
        self.status == OrderStatus::Completed
    }

    /// Mark the order completed.
    ///
    /// Callers must check `is_completed()` first under the row lock; calling
    /// this on an already-completed order is an invalid transition.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn complete(&mut self, at: Timestamp) -> Result<(), DomainError> {
        self.transition_to(OrderStatus::Completed)?;
        self.completed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Mark the order failed after a definitive payment failure.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn fail(&mut self, at: Timestamp) -> Result<(), DomainError> {
        self.transition_to(OrderStatus::Failed)?;
        self.updated_at = at;
        Ok(())
    }

    /// Cancel an order that never reached payment.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition_to(OrderStatus::Cancelled)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    fn transition_to(&mut self, target: OrderStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition order from {:?} to {:?}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order() -> Order {
        Order::new(UserId::new(), CourseId::new(), 10000)
    }

    #[test]
    fn new_order_starts_pending() {
        let order = test_order();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount_cents, 10000);
        assert!(order.payment_id.is_none());
        assert!(order.completed_at.is_none());
    }

    #[test]
    fn attach_payment_links_record() {
        let mut order = test_order();
        let payment_id = PaymentId::new();

        order.attach_payment(payment_id);

        assert_eq!(order.payment_id, Some(payment_id));
    }

    #[test]
    fn pending_order_can_complete() {
        let mut order = test_order();
        let at = Timestamp::now();

        order.complete(at).unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.completed_at, Some(at));
        assert!(order.is_completed());
    }

    #[test]
    fn processing_order_can_complete() {
        let mut order = test_order();
        order.status = OrderStatus::Processing;

        assert!(order.complete(Timestamp::now()).is_ok());
    }

    #[test]
    fn completed_order_cannot_complete_again() {
        let mut order = test_order();
        order.complete(Timestamp::now()).unwrap();

        let result = order.complete(Timestamp::now());

        assert!(result.is_err());
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn failed_order_cannot_complete() {
        let mut order = test_order();
        order.fail(Timestamp::now()).unwrap();

        let result = order.complete(Timestamp::now());

        assert!(result.is_err());
        assert_eq!(order.status, OrderStatus::Failed);
        assert!(order.completed_at.is_none());
    }

    #[test]
    fn cancelled_order_cannot_fail() {
        let mut order = test_order();
        order.cancel().unwrap();

        assert!(order.fail(Timestamp::now()).is_err());
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
    }

    #[test]
    fn completed_at_set_iff_completed() {
        let mut completed = test_order();
        completed.complete(Timestamp::now()).unwrap();
        assert!(completed.completed_at.is_some());

        let mut failed = test_order();
        failed.fail(Timestamp::now()).unwrap();
        assert!(failed.completed_at.is_none());
    }
}
