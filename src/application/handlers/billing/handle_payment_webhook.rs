//! HandlePaymentWebhookHandler - provider webhook verification and routing.
//!
//! Verifies the signature through the `PaymentProvider` port (fail closed;
//! nothing is mutated on verification failure), then routes the normalized
//! event. Delivery semantics follow the provider's retry model: anything
//! that would fail identically on redelivery is acknowledged and logged,
//! only transient persistence failures surface as retryable.

use std::sync::Arc;

use crate::domain::billing::{BillingError, ProviderEvent, ProviderEventKind};
use crate::domain::foundation::{OrderId, PaymentId, Timestamp};
use crate::ports::{LedgerStore, PaymentProvider};

use super::{CompleteOrderCommand, CompleteOrderHandler, CompleteOrderResult};

/// Command carrying the raw webhook request.
#[derive(Debug, Clone)]
pub struct HandlePaymentWebhookCommand {
    /// Raw request body, exactly as received (signatures cover the bytes).
    pub payload: Vec<u8>,

    /// Provider signature header value.
    pub signature: String,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlePaymentWebhookResult {
    /// A checkout or payment event completed an order.
    OrderCompleted { order_id: OrderId },

    /// The referenced order had already completed.
    AlreadyCompleted { order_id: OrderId },

    /// A failure event marked the payment (and possibly its order) failed.
    PaymentFailed { payment_id: PaymentId },

    /// Event was valid but required no action (missing/stale references,
    /// unpaid session, standalone payment finalization).
    Acknowledged,

    /// Event kind is not one the platform reacts to.
    Ignored,
}

/// Handler for inbound payment provider webhooks.
pub struct HandlePaymentWebhookHandler {
    provider: Arc<dyn PaymentProvider>,
    ledger: Arc<dyn LedgerStore>,
    completion: Arc<CompleteOrderHandler>,
}

impl HandlePaymentWebhookHandler {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        ledger: Arc<dyn LedgerStore>,
        completion: Arc<CompleteOrderHandler>,
    ) -> Self {
        Self {
            provider,
            ledger,
            completion,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandlePaymentWebhookCommand,
    ) -> Result<HandlePaymentWebhookResult, BillingError> {
        // 1. Authenticate before touching any state.
        let event = self
            .provider
            .verify_webhook(&cmd.payload, &cmd.signature)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Webhook rejected: verification failed");
                BillingError::InvalidWebhookSignature
            })?;

        tracing::debug!(
            event_id = %event.id,
            kind = event.kind.as_str(),
            "Webhook event verified"
        );

        // 2. Route by kind. Handler errors that would repeat identically on
        // redelivery are downgraded to acknowledgements here.
        let outcome = match event.kind {
            ProviderEventKind::CheckoutCompleted => self.on_checkout_completed(&event).await,
            ProviderEventKind::PaymentSucceeded => self.on_payment_succeeded(&event).await,
            ProviderEventKind::PaymentFailed => self.on_payment_failed(&event).await,
            ProviderEventKind::Unknown(ref kind) => {
                tracing::debug!(event_id = %event.id, kind, "Ignoring unhandled event kind");
                Ok(HandlePaymentWebhookResult::Ignored)
            }
        };

        match outcome {
            Err(e) if !e.is_retryable() => {
                tracing::error!(
                    event_id = %event.id,
                    kind = event.kind.as_str(),
                    error = %e,
                    "Webhook handling failed non-retryably; acknowledging"
                );
                Ok(HandlePaymentWebhookResult::Acknowledged)
            }
            other => other,
        }
    }

    async fn on_checkout_completed(
        &self,
        event: &ProviderEvent,
    ) -> Result<HandlePaymentWebhookResult, BillingError> {
        let Some(order_id) = event.order_id else {
            tracing::warn!(
                event_id = %event.id,
                "checkout.session.completed without order metadata"
            );
            return Ok(HandlePaymentWebhookResult::Acknowledged);
        };

        // Delayed-capture sessions complete before funds settle; the
        // payment_intent.succeeded backstop finishes those later.
        if let Some(status) = event.payment_status {
            if !status.is_paid() {
                tracing::info!(
                    event_id = %event.id,
                    order_id = %order_id,
                    ?status,
                    "Session completed but not paid; deferring to payment events"
                );
                return Ok(HandlePaymentWebhookResult::Acknowledged);
            }
        }

        self.complete(order_id, event.payment_intent_id.clone())
            .await
    }

    async fn on_payment_succeeded(
        &self,
        event: &ProviderEvent,
    ) -> Result<HandlePaymentWebhookResult, BillingError> {
        let Some(intent_id) = event.payment_intent_id.as_deref() else {
            tracing::warn!(event_id = %event.id, "payment_intent.succeeded without intent id");
            return Ok(HandlePaymentWebhookResult::Acknowledged);
        };

        let Some(payment) = self.ledger.find_payment_by_intent(intent_id).await? else {
            tracing::warn!(
                event_id = %event.id,
                intent_id,
                "Succeeded event for unknown payment intent"
            );
            return Ok(HandlePaymentWebhookResult::Acknowledged);
        };

        // Backstop: when the checkout-completed event was missed, the linked
        // order still converges through the same completion routine.
        if let Some(order) = self.ledger.find_order_by_payment(&payment.id).await? {
            return self.complete(order.id, Some(intent_id.to_string())).await;
        }

        // No order context: finalize the payment record alone.
        let mut tx = self.ledger.begin().await?;
        let Some(mut payment) = tx.find_payment_by_intent_for_update(intent_id).await? else {
            return Ok(HandlePaymentWebhookResult::Acknowledged);
        };
        payment.complete(Timestamp::now(), Some(intent_id))?;
        tx.update_payment(&payment).await?;
        tx.commit().await?;

        tracing::info!(intent_id, payment_id = %payment.id, "Payment finalized");
        Ok(HandlePaymentWebhookResult::Acknowledged)
    }

    async fn on_payment_failed(
        &self,
        event: &ProviderEvent,
    ) -> Result<HandlePaymentWebhookResult, BillingError> {
        let Some(intent_id) = event.payment_intent_id.as_deref() else {
            tracing::warn!(event_id = %event.id, "payment_intent.payment_failed without intent id");
            return Ok(HandlePaymentWebhookResult::Acknowledged);
        };

        let now = Timestamp::now();
        let mut tx = self.ledger.begin().await?;

        let Some(mut payment) = tx.find_payment_by_intent_for_update(intent_id).await? else {
            tracing::warn!(
                event_id = %event.id,
                intent_id,
                "Failure event for unknown payment intent"
            );
            return Ok(HandlePaymentWebhookResult::Acknowledged);
        };

        if payment.is_completed() {
            // Out-of-order delivery after a success; the success wins.
            tracing::info!(
                intent_id,
                payment_id = %payment.id,
                "Ignoring failure event for completed payment"
            );
            return Ok(HandlePaymentWebhookResult::Acknowledged);
        }

        payment.fail(now)?;
        tx.update_payment(&payment).await?;

        if let Some(mut order) = tx.find_order_by_payment(&payment.id).await? {
            if !order.is_completed() {
                order.fail(now)?;
                tx.update_order(&order).await?;
            }
        }

        tx.commit().await?;

        tracing::info!(intent_id, payment_id = %payment.id, "Payment marked failed");
        Ok(HandlePaymentWebhookResult::PaymentFailed {
            payment_id: payment.id,
        })
    }

    async fn complete(
        &self,
        order_id: OrderId,
        payment_intent_id: Option<String>,
    ) -> Result<HandlePaymentWebhookResult, BillingError> {
        let result = self
            .completion
            .handle(CompleteOrderCommand {
                order_id,
                payment_intent_id,
            })
            .await?;

        Ok(match result {
            CompleteOrderResult::Completed { order } => {
                HandlePaymentWebhookResult::OrderCompleted { order_id: order.id }
            }
            CompleteOrderResult::AlreadyCompleted { order } => {
                HandlePaymentWebhookResult::AlreadyCompleted { order_id: order.id }
            }
            CompleteOrderResult::NotFound => HandlePaymentWebhookResult::Acknowledged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedger;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::{Order, Payment, PaymentStatus, ProviderPaymentStatus};
    use crate::domain::foundation::{CourseId, DomainError, UserId};
    use crate::ports::{
        CourseCatalog, CourseSummary, EmailMessage, MailError, Mailer, UserProfile,
    };
    use crate::application::handlers::billing::PurchaseNotifier;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubCatalog;

    #[async_trait]
    impl CourseCatalog for StubCatalog {
        async fn find_course(
            &self,
            id: &CourseId,
        ) -> Result<Option<CourseSummary>, DomainError> {
            Ok(Some(CourseSummary {
                id: *id,
                slug: "course".to_string(),
                title: "Course".to_string(),
                price_cents: 10000,
                is_published: true,
            }))
        }

        async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, DomainError> {
            Ok(Some(UserProfile {
                id: *id,
                email: "student@example.com".to_string(),
                display_name: "Student".to_string(),
            }))
        }
    }

    struct CountingMailer {
        sent: AtomicU32,
    }

    #[async_trait]
    impl Mailer for CountingMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<(), MailError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        provider: Arc<MockPaymentProvider>,
        mailer: Arc<CountingMailer>,
        handler: HandlePaymentWebhookHandler,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let mailer = Arc::new(CountingMailer {
            sent: AtomicU32::new(0),
        });
        let notifier = Arc::new(PurchaseNotifier::new(
            Arc::new(StubCatalog),
            mailer.clone(),
            "https://academy.example.com",
        ));
        let completion = Arc::new(CompleteOrderHandler::new(ledger.clone(), notifier));
        let handler =
            HandlePaymentWebhookHandler::new(provider.clone(), ledger.clone(), completion);
        Fixture {
            ledger,
            provider,
            mailer,
            handler,
        }
    }

    async fn seed_order(f: &Fixture, intent: Option<&str>) -> (Order, Payment) {
        let user_id = UserId::new();
        let course_id = CourseId::new();
        let payment = Payment::new(
            user_id,
            course_id,
            10000,
            "USD",
            intent.map(|s| s.to_string()),
        );
        let mut order = Order::new(user_id, course_id, 10000);
        order.attach_payment(payment.id);
        f.ledger.insert_payment(&payment).await.unwrap();
        f.ledger.insert_order(&order).await.unwrap();
        (order, payment)
    }

    fn checkout_event(order: &Order, status: ProviderPaymentStatus) -> ProviderEvent {
        ProviderEvent {
            id: "evt_checkout".to_string(),
            kind: ProviderEventKind::CheckoutCompleted,
            order_id: Some(order.id),
            user_id: Some(order.user_id),
            course_id: Some(order.course_id),
            payment_status: Some(status),
            payment_intent_id: Some("pi_1".to_string()),
            created_at: 1704067200,
        }
    }

    fn cmd() -> HandlePaymentWebhookCommand {
        HandlePaymentWebhookCommand {
            payload: b"{}".to_vec(),
            signature: "t=1,v1=ok".to_string(),
        }
    }

    // ════════════════════════════════════════════════════════════════
    // Verification Tests
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invalid_signature_mutates_nothing() {
        let f = fixture();
        let (order, _) = seed_order(&f, None).await;
        f.provider.fail_verification();

        let result = f.handler.handle(cmd()).await;

        assert!(matches!(result, Err(BillingError::InvalidWebhookSignature)));
        let stored = f.ledger.find_order(&order.id).await.unwrap().unwrap();
        assert!(!stored.is_completed());
        assert_eq!(f.ledger.enrollment_count().await, 0);
        assert_eq!(f.mailer.sent.load(Ordering::SeqCst), 0);
    }

    // ════════════════════════════════════════════════════════════════
    // Checkout Completed Tests
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_completed_completes_order() {
        let f = fixture();
        let (order, _) = seed_order(&f, None).await;
        f.provider
            .push_event(checkout_event(&order, ProviderPaymentStatus::Paid));

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(
            result,
            HandlePaymentWebhookResult::OrderCompleted { order_id: order.id }
        );
        let payment = f
            .ledger
            .find_payment_by_intent("pi_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(f.mailer.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_delivery_converges_without_extra_effects() {
        let f = fixture();
        let (order, _) = seed_order(&f, None).await;
        f.provider
            .push_event(checkout_event(&order, ProviderPaymentStatus::Paid));
        f.provider
            .push_event(checkout_event(&order, ProviderPaymentStatus::Paid));

        let first = f.handler.handle(cmd()).await.unwrap();
        let second = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(
            first,
            HandlePaymentWebhookResult::OrderCompleted { order_id: order.id }
        );
        assert_eq!(
            second,
            HandlePaymentWebhookResult::AlreadyCompleted { order_id: order.id }
        );
        assert_eq!(f.ledger.enrollment_count().await, 1);
        assert_eq!(f.mailer.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unpaid_session_is_acknowledged_without_completion() {
        let f = fixture();
        let (order, _) = seed_order(&f, None).await;
        f.provider
            .push_event(checkout_event(&order, ProviderPaymentStatus::Unpaid));

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(result, HandlePaymentWebhookResult::Acknowledged);
        let stored = f.ledger.find_order(&order.id).await.unwrap().unwrap();
        assert!(!stored.is_completed());
    }

    #[tokio::test]
    async fn checkout_without_metadata_is_acknowledged() {
        let f = fixture();
        let mut event = checkout_event(
            &Order::new(UserId::new(), CourseId::new(), 1000),
            ProviderPaymentStatus::Paid,
        );
        event.order_id = None;
        f.provider.push_event(event);

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(result, HandlePaymentWebhookResult::Acknowledged);
    }

    #[tokio::test]
    async fn stale_order_reference_is_acknowledged() {
        let f = fixture();
        let mut event = checkout_event(
            &Order::new(UserId::new(), CourseId::new(), 1000),
            ProviderPaymentStatus::Paid,
        );
        event.order_id = Some(OrderId::new());
        f.provider.push_event(event);

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(result, HandlePaymentWebhookResult::Acknowledged);
    }

    // ════════════════════════════════════════════════════════════════
    // Payment Succeeded (Backstop) Tests
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn payment_succeeded_completes_linked_order() {
        let f = fixture();
        let (order, _) = seed_order(&f, Some("pi_42")).await;
        f.provider.push_event(ProviderEvent {
            id: "evt_intent".to_string(),
            kind: ProviderEventKind::PaymentSucceeded,
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: Some("pi_42".to_string()),
            created_at: 1704067200,
        });

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(
            result,
            HandlePaymentWebhookResult::OrderCompleted { order_id: order.id }
        );
        let stored = f.ledger.find_order(&order.id).await.unwrap().unwrap();
        assert!(stored.is_completed());
        assert_eq!(f.mailer.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn events_converge_in_either_arrival_order() {
        let f = fixture();
        let (order, _) = seed_order(&f, Some("pi_42")).await;

        // payment_intent.succeeded first, checkout.session.completed second.
        f.provider.push_event(ProviderEvent {
            id: "evt_intent".to_string(),
            kind: ProviderEventKind::PaymentSucceeded,
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: Some("pi_42".to_string()),
            created_at: 1704067200,
        });
        f.provider
            .push_event(checkout_event(&order, ProviderPaymentStatus::Paid));

        let first = f.handler.handle(cmd()).await.unwrap();
        let second = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(
            first,
            HandlePaymentWebhookResult::OrderCompleted { order_id: order.id }
        );
        assert_eq!(
            second,
            HandlePaymentWebhookResult::AlreadyCompleted { order_id: order.id }
        );
        assert_eq!(f.ledger.enrollment_count().await, 1);
        assert_eq!(f.mailer.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn payment_succeeded_for_unknown_intent_is_acknowledged() {
        let f = fixture();
        f.provider.push_event(ProviderEvent {
            id: "evt_intent".to_string(),
            kind: ProviderEventKind::PaymentSucceeded,
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: Some("pi_unknown".to_string()),
            created_at: 1704067200,
        });

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(result, HandlePaymentWebhookResult::Acknowledged);
    }

    // ════════════════════════════════════════════════════════════════
    // Payment Failed Tests
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn payment_failed_marks_payment_and_order() {
        let f = fixture();
        let (order, payment) = seed_order(&f, Some("pi_9")).await;
        f.provider.push_event(ProviderEvent {
            id: "evt_fail".to_string(),
            kind: ProviderEventKind::PaymentFailed,
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: Some("pi_9".to_string()),
            created_at: 1704067200,
        });

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(
            result,
            HandlePaymentWebhookResult::PaymentFailed {
                payment_id: payment.id
            }
        );
        let stored_payment = f
            .ledger
            .find_payment_by_intent("pi_9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored_payment.status, PaymentStatus::Failed);
        let stored_order = f.ledger.find_order(&order.id).await.unwrap().unwrap();
        assert_eq!(
            stored_order.status,
            crate::domain::billing::OrderStatus::Failed
        );
    }

    #[tokio::test]
    async fn late_failure_after_success_is_ignored() {
        let f = fixture();
        let (order, _) = seed_order(&f, Some("pi_9")).await;

        f.provider
            .push_event(checkout_event(&order, ProviderPaymentStatus::Paid));
        f.handler.handle(cmd()).await.unwrap();

        f.provider.push_event(ProviderEvent {
            id: "evt_fail".to_string(),
            kind: ProviderEventKind::PaymentFailed,
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: Some("pi_9".to_string()),
            created_at: 1704067200,
        });
        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(result, HandlePaymentWebhookResult::Acknowledged);
        let stored = f.ledger.find_order(&order.id).await.unwrap().unwrap();
        assert!(stored.is_completed());
    }

    #[tokio::test]
    async fn failure_for_unknown_intent_is_acknowledged() {
        let f = fixture();
        f.provider.push_event(ProviderEvent {
            id: "evt_fail".to_string(),
            kind: ProviderEventKind::PaymentFailed,
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: Some("pi_nowhere".to_string()),
            created_at: 1704067200,
        });

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(result, HandlePaymentWebhookResult::Acknowledged);
    }

    // ════════════════════════════════════════════════════════════════
    // Unknown Kind Tests
    // ════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_event_kind_is_ignored() {
        let f = fixture();
        f.provider.push_event(ProviderEvent {
            id: "evt_other".to_string(),
            kind: ProviderEventKind::Unknown("charge.refunded".to_string()),
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: None,
            created_at: 1704067200,
        });

        let result = f.handler.handle(cmd()).await.unwrap();

        assert_eq!(result, HandlePaymentWebhookResult::Ignored);
    }
}
