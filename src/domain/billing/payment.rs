//! Payment record entity.
//!
//! One Payment is authoritative per Order. A Payment can also be located
//! independently by its provider payment-intent identifier, which is how
//! `payment_intent.*` events without order context find their record.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    CourseId, DomainError, ErrorCode, PaymentId, StateMachine, Timestamp, UserId,
};

/// Payment transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created alongside the checkout session, awaiting the provider.
    Pending,

    /// Funds captured.
    Completed,

    /// Provider reported a definitive failure.
    Failed,

    /// Captured funds returned. Terminal.
    Refunded,
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Completed)
                | (Pending, Failed)
                // A later attempt on the same intent can still succeed.
                | (Failed, Completed)
                | (Completed, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Completed, Failed],
            Failed => vec![Completed],
            Completed => vec![Refunded],
            Refunded => vec![],
        }
    }
}

/// Payment record - the monetary transaction tied to one Order.
///
/// # Invariants
///
/// - `status == Completed` implies `completed_at` is set
/// - Terminal records are immutable except for backfilling a missing
///   provider payment-intent identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier for this payment.
    pub id: PaymentId,

    /// User who paid.
    pub user_id: UserId,

    /// Course the payment is for.
    pub course_id: CourseId,

    /// Amount in cents.
    pub amount_cents: i64,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Current transaction status.
    pub status: PaymentStatus,

    /// Provider payment-intent identifier (pi_...), if known yet.
    ///
    /// Checkout sessions in payment mode only expose the intent once the
    /// session completes, so this starts empty and is backfilled.
    pub stripe_payment_intent_id: Option<String>,

    /// Provider charge identifier, if known.
    pub stripe_charge_id: Option<String>,

    /// Payment method label reported by the provider (e.g. "card").
    pub payment_method: Option<String>,

    /// Provider-side transaction reference.
    pub transaction_id: Option<String>,

    /// When the payment record was created.
    pub created_at: Timestamp,

    /// When the payment record was last updated.
    pub updated_at: Timestamp,

    /// When funds were captured, if they were.
    pub completed_at: Option<Timestamp>,
}

impl Payment {
    /// Create a new pending payment alongside a checkout session.
    pub fn new(
        user_id: UserId,
        course_id: CourseId,
        amount_cents: i64,
        currency: impl Into<String>,
        stripe_payment_intent_id: Option<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: PaymentId::new(),
            user_id,
            course_id,
            amount_cents,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            stripe_payment_intent_id,
            stripe_charge_id: None,
            payment_method: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Returns true once funds have been captured.
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Finalize the payment after the provider confirmed capture.
    ///
    /// Idempotent: completing an already-completed payment only backfills a
    /// missing provider intent identifier. Backfill never overwrites an
    /// identifier that is already present.
    ///
    /// # Errors
    ///
    /// Returns error if the payment is refunded (invalid transition).
    pub fn complete(
        &mut self,
        at: Timestamp,
        provider_intent_id: Option<&str>,
    ) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Completed {
            self.transition_to(PaymentStatus::Completed)?;
            self.completed_at = Some(at);
            self.updated_at = at;
        }
        self.backfill_intent(provider_intent_id);
        Ok(())
    }

    /// Mark the payment failed.
    ///
    /// Idempotent for repeated failure events.
    ///
    /// # Errors
    ///
    /// Returns error if the payment already completed or was refunded.
    pub fn fail(&mut self, at: Timestamp) -> Result<(), DomainError> {
        if self.status == PaymentStatus::Failed {
            return Ok(());
        }
        self.transition_to(PaymentStatus::Failed)?;
        self.updated_at = at;
        Ok(())
    }

    /// Mark captured funds as returned.
    ///
    /// # Errors
    ///
    /// Returns error if the payment never completed.
    pub fn refund(&mut self, at: Timestamp) -> Result<(), DomainError> {
        self.transition_to(PaymentStatus::Refunded)?;
        self.updated_at = at;
        Ok(())
    }

    /// Record provider identifiers if they are not already set.
    pub fn backfill_intent(&mut self, provider_intent_id: Option<&str>) {
        if let Some(intent) = provider_intent_id.filter(|s| !s.is_empty()) {
            if self.stripe_payment_intent_id.is_none() {
                self.stripe_payment_intent_id = Some(intent.to_string());
            }
            if self.stripe_charge_id.is_none() {
                self.stripe_charge_id = Some(intent.to_string());
            }
        }
    }

    fn transition_to(&mut self, target: PaymentStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition payment from {:?} to {:?}",
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

    fn test_payment() -> Payment {
        Payment::new(UserId::new(), CourseId::new(), 10000, "USD", None)
    }

    #[test]
    fn new_payment_starts_pending() {
        let payment = test_payment();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.currency, "USD");
        assert!(payment.stripe_payment_intent_id.is_none());
        assert!(payment.completed_at.is_none());
    }

    #[test]
    fn complete_sets_completed_at_and_intent() {
        let mut payment = test_payment();
        let at = Timestamp::now();

        payment.complete(at, Some("pi_1")).unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.completed_at, Some(at));
        assert_eq!(payment.stripe_payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(payment.stripe_charge_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn complete_is_idempotent() {
        let mut payment = test_payment();
        let first = Timestamp::now();
        payment.complete(first, Some("pi_1")).unwrap();

        payment.complete(Timestamp::now(), Some("pi_other")).unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        // First completion timestamp and intent win.
        assert_eq!(payment.completed_at, Some(first));
        assert_eq!(payment.stripe_payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn backfill_only_fills_empty_intent() {
        let mut payment = Payment::new(
            UserId::new(),
            CourseId::new(),
            5000,
            "USD",
            Some("pi_original".to_string()),
        );

        payment.backfill_intent(Some("pi_new"));

        assert_eq!(
            payment.stripe_payment_intent_id.as_deref(),
            Some("pi_original")
        );
    }

    #[test]
    fn backfill_ignores_empty_string() {
        let mut payment = test_payment();

        payment.backfill_intent(Some(""));

        assert!(payment.stripe_payment_intent_id.is_none());
    }

    #[test]
    fn pending_payment_can_fail() {
        let mut payment = test_payment();

        payment.fail(Timestamp::now()).unwrap();

        assert_eq!(payment.status, PaymentStatus::Failed);
    }

    #[test]
    fn fail_is_idempotent() {
        let mut payment = test_payment();
        payment.fail(Timestamp::now()).unwrap();

        assert!(payment.fail(Timestamp::now()).is_ok());
        assert_eq!(payment.status, PaymentStatus::Failed);
    }

    #[test]
    fn completed_payment_cannot_fail() {
        let mut payment = test_payment();
        payment.complete(Timestamp::now(), Some("pi_1")).unwrap();

        assert!(payment.fail(Timestamp::now()).is_err());
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn failed_payment_can_recover_to_completed() {
        let mut payment = test_payment();
        payment.fail(Timestamp::now()).unwrap();

        payment.complete(Timestamp::now(), Some("pi_retry")).unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn completed_payment_can_refund() {
        let mut payment = test_payment();
        payment.complete(Timestamp::now(), Some("pi_1")).unwrap();

        payment.refund(Timestamp::now()).unwrap();

        assert_eq!(payment.status, PaymentStatus::Refunded);
    }

    #[test]
    fn pending_payment_cannot_refund() {
        let mut payment = test_payment();

        assert!(payment.refund(Timestamp::now()).is_err());
    }

    #[test]
    fn refunded_is_terminal() {
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Completed.is_terminal());
    }
}
