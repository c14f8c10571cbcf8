//! ReconcileReturnHandler - fallback reconciliation on checkout return.
//!
//! Triggered when the user's browser lands back on the success URL. The
//! redirect itself proves nothing: query parameters are attacker-writable,
//! so the only trusted inputs are the authenticated user, the ledger, and
//! the session state re-fetched from the provider by id. The path is
//! advisory - it accelerates the UX when the webhook is slow, and the
//! system must converge identically with it disabled.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Order};
use crate::domain::foundation::{OrderId, UserId};
use crate::ports::{LedgerStore, PaymentProvider};

use super::{CompleteOrderCommand, CompleteOrderHandler, CompleteOrderResult};

/// Command carrying the return-page request.
#[derive(Debug, Clone)]
pub struct ReconcileReturnCommand {
    /// Order the user claims to have paid.
    pub order_id: OrderId,

    /// Authenticated requesting user; must own the order.
    pub user_id: UserId,

    /// Provider session id from the redirect, when present.
    pub session_id: Option<String>,
}

/// What the return page should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnView {
    /// Order is completed; the user is enrolled.
    Completed { order: Order },

    /// Payment not confirmed yet; the webhook remains the source of truth.
    Processing,
}

/// Handler for the return-from-checkout page.
pub struct ReconcileReturnHandler {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<dyn PaymentProvider>,
    completion: Arc<CompleteOrderHandler>,
    /// Whether this deployment trusts the return path to trigger completion.
    reconcile_enabled: bool,
}

impl ReconcileReturnHandler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        provider: Arc<dyn PaymentProvider>,
        completion: Arc<CompleteOrderHandler>,
        reconcile_enabled: bool,
    ) -> Self {
        Self {
            ledger,
            provider,
            completion,
            reconcile_enabled,
        }
    }

    pub async fn handle(&self, cmd: ReconcileReturnCommand) -> Result<ReturnView, BillingError> {
        let order = self
            .ledger
            .find_order(&cmd.order_id)
            .await?
            .ok_or(BillingError::OrderNotFound(cmd.order_id))?;

        if order.user_id != cmd.user_id {
            tracing::warn!(
                order_id = %cmd.order_id,
                requester = %cmd.user_id,
                owner = %order.user_id,
                "Checkout return for an order the requester does not own"
            );
            return Err(BillingError::not_order_owner(cmd.order_id, cmd.user_id));
        }

        if order.is_completed() {
            return Ok(ReturnView::Completed { order });
        }

        if !self.reconcile_enabled {
            return Ok(ReturnView::Processing);
        }

        let Some(session_id) = cmd.session_id.as_deref() else {
            return Ok(ReturnView::Processing);
        };

        let Some(session) = self.verified_session(&order, &cmd.user_id, session_id).await
        else {
            return Ok(ReturnView::Processing);
        };

        match self
            .completion
            .handle(CompleteOrderCommand {
                order_id: order.id,
                payment_intent_id: session.payment_intent_id,
            })
            .await?
        {
            CompleteOrderResult::Completed { order }
            | CompleteOrderResult::AlreadyCompleted { order } => {
                Ok(ReturnView::Completed { order })
            }
            CompleteOrderResult::NotFound => Ok(ReturnView::Processing),
        }
    }

    /// Re-verify payment state with the provider.
    ///
    /// Returns the session only when all three conditions hold: the provider
    /// reports it as paid, and the session's own metadata names exactly this
    /// order and this user. Anything else is a mismatch - possibly a
    /// tampered session id - and leaves the order for the webhook to settle.
    async fn verified_session(
        &self,
        order: &Order,
        user_id: &UserId,
        session_id: &str,
    ) -> Option<crate::ports::ProviderSession> {
        let session = match self.provider.get_checkout_session(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!(order_id = %order.id, session_id, "Unknown checkout session");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id,
                    session_id,
                    error = %e,
                    "Could not fetch session state; leaving order pending"
                );
                return None;
            }
        };

        if !session.payment_status.is_paid() {
            tracing::info!(
                order_id = %order.id,
                session_id,
                status = ?session.payment_status,
                "Session not paid yet"
            );
            return None;
        }

        if session.metadata.order_id != Some(order.id) {
            tracing::warn!(
                order_id = %order.id,
                session_id,
                "Session metadata names a different order; possible tampering"
            );
            return None;
        }

        if session.metadata.user_id != Some(*user_id) {
            tracing::warn!(
                order_id = %order.id,
                session_id,
                "Session metadata names a different user; possible tampering"
            );
            return None;
        }

        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedger;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::application::handlers::billing::PurchaseNotifier;
    use crate::domain::billing::{Payment, ProviderPaymentStatus, SessionMetadata};
    use crate::domain::foundation::{CourseId, DomainError, Timestamp};
    use crate::ports::{
        CourseCatalog, CourseSummary, EmailMessage, MailError, Mailer, ProviderSession,
        UserProfile,
    };
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
        handler: ReconcileReturnHandler,
    }

    fn fixture_with_flag(reconcile_enabled: bool) -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let notifier = Arc::new(PurchaseNotifier::new(
            Arc::new(StubCatalog),
            Arc::new(CountingMailer {
                sent: AtomicU32::new(0),
            }),
            "https://academy.example.com",
        ));
        let completion = Arc::new(CompleteOrderHandler::new(ledger.clone(), notifier));
        let handler = ReconcileReturnHandler::new(
            ledger.clone(),
            provider.clone(),
            completion,
            reconcile_enabled,
        );
        Fixture {
            ledger,
            provider,
            handler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_flag(true)
    }

    async fn seed_order(f: &Fixture) -> Order {
        let user_id = UserId::new();
        let course_id = CourseId::new();
        let payment = Payment::new(user_id, course_id, 10000, "USD", None);
        let mut order = Order::new(user_id, course_id, 10000);
        order.attach_payment(payment.id);
        f.ledger.insert_payment(&payment).await.unwrap();
        f.ledger.insert_order(&order).await.unwrap();
        order
    }

    fn paid_session(order: &Order) -> ProviderSession {
        ProviderSession {
            id: "cs_1".to_string(),
            payment_status: ProviderPaymentStatus::Paid,
            payment_intent_id: Some("pi_1".to_string()),
            metadata: SessionMetadata {
                order_id: Some(order.id),
                user_id: Some(order.user_id),
                course_id: Some(order.course_id),
            },
        }
    }

    fn cmd(order: &Order, session_id: Option<&str>) -> ReconcileReturnCommand {
        ReconcileReturnCommand {
            order_id: order.id,
            user_id: order.user_id,
            session_id: session_id.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn verified_paid_session_completes_pending_order() {
        let f = fixture();
        let order = seed_order(&f).await;
        f.provider.insert_session(paid_session(&order));

        let view = f.handler.handle(cmd(&order, Some("cs_1"))).await.unwrap();

        assert!(matches!(view, ReturnView::Completed { .. }));
        let stored = f.ledger.find_order(&order.id).await.unwrap().unwrap();
        assert!(stored.is_completed());
        let enrollment = f
            .ledger
            .find_enrollment(&order.user_id, &order.course_id)
            .await
            .unwrap();
        assert!(enrollment.is_some());
    }

    #[tokio::test]
    async fn already_completed_order_renders_without_side_effects() {
        let f = fixture();
        let mut order = seed_order(&f).await;
        {
            let mut tx = f.ledger.begin().await.unwrap();
            order.complete(Timestamp::now()).unwrap();
            tx.update_order(&order).await.unwrap();
            tx.commit().await.unwrap();
        }

        // No session configured: the provider must not even be consulted.
        let view = f.handler.handle(cmd(&order, Some("cs_1"))).await.unwrap();

        assert!(matches!(view, ReturnView::Completed { .. }));
    }

    #[tokio::test]
    async fn unpaid_session_leaves_order_pending() {
        let f = fixture();
        let order = seed_order(&f).await;
        let mut session = paid_session(&order);
        session.payment_status = ProviderPaymentStatus::Unpaid;
        f.provider.insert_session(session);

        let view = f.handler.handle(cmd(&order, Some("cs_1"))).await.unwrap();

        assert_eq!(view, ReturnView::Processing);
        let stored = f.ledger.find_order(&order.id).await.unwrap().unwrap();
        assert!(!stored.is_completed());
        assert_eq!(f.ledger.enrollment_count().await, 0);
    }

    #[tokio::test]
    async fn mismatched_order_metadata_is_rejected() {
        let f = fixture();
        let order = seed_order(&f).await;
        let mut session = paid_session(&order);
        session.metadata.order_id = Some(OrderId::new());
        f.provider.insert_session(session);

        let view = f.handler.handle(cmd(&order, Some("cs_1"))).await.unwrap();

        assert_eq!(view, ReturnView::Processing);
        assert!(!f
            .ledger
            .find_order(&order.id)
            .await
            .unwrap()
            .unwrap()
            .is_completed());
    }

    #[tokio::test]
    async fn mismatched_user_metadata_is_rejected() {
        let f = fixture();
        let order = seed_order(&f).await;
        let mut session = paid_session(&order);
        session.metadata.user_id = Some(UserId::new());
        f.provider.insert_session(session);

        let view = f.handler.handle(cmd(&order, Some("cs_1"))).await.unwrap();

        assert_eq!(view, ReturnView::Processing);
    }

    #[tokio::test]
    async fn missing_session_id_renders_processing() {
        let f = fixture();
        let order = seed_order(&f).await;

        let view = f.handler.handle(cmd(&order, None)).await.unwrap();

        assert_eq!(view, ReturnView::Processing);
    }

    #[tokio::test]
    async fn unknown_session_id_renders_processing() {
        let f = fixture();
        let order = seed_order(&f).await;

        let view = f
            .handler
            .handle(cmd(&order, Some("cs_missing")))
            .await
            .unwrap();

        assert_eq!(view, ReturnView::Processing);
    }

    #[tokio::test]
    async fn provider_fetch_failure_renders_processing() {
        let f = fixture();
        let order = seed_order(&f).await;
        f.provider.insert_session(paid_session(&order));
        f.provider.fail_session_fetch();

        let view = f.handler.handle(cmd(&order, Some("cs_1"))).await.unwrap();

        assert_eq!(view, ReturnView::Processing);
        assert!(!f
            .ledger
            .find_order(&order.id)
            .await
            .unwrap()
            .unwrap()
            .is_completed());
    }

    #[tokio::test]
    async fn disabled_flag_never_consults_the_provider() {
        let f = fixture_with_flag(false);
        let order = seed_order(&f).await;
        f.provider.insert_session(paid_session(&order));

        let view = f.handler.handle(cmd(&order, Some("cs_1"))).await.unwrap();

        assert_eq!(view, ReturnView::Processing);
        assert_eq!(f.provider.session_fetch_count(), 0);
        assert!(!f
            .ledger
            .find_order(&order.id)
            .await
            .unwrap()
            .unwrap()
            .is_completed());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let f = fixture();

        let result = f
            .handler
            .handle(ReconcileReturnCommand {
                order_id: OrderId::new(),
                user_id: UserId::new(),
                session_id: None,
            })
            .await;

        assert!(matches!(result, Err(BillingError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn foreign_order_is_an_ownership_error() {
        let f = fixture();
        let order = seed_order(&f).await;

        let result = f
            .handler
            .handle(ReconcileReturnCommand {
                order_id: order.id,
                user_id: UserId::new(),
                session_id: Some("cs_1".to_string()),
            })
            .await;

        assert!(matches!(result, Err(BillingError::NotOrderOwner { .. })));
        assert!(!f
            .ledger
            .find_order(&order.id)
            .await
            .unwrap()
            .unwrap()
            .is_completed());
    }
}
