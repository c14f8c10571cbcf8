//! CreateCheckoutHandler - start a paid course purchase.
//!
//! Creates the Order and Payment ledger records and asks the provider for a
//! hosted checkout session. The session metadata carries the order, user,
//! and course identifiers; both reconciliation paths re-validate those, so
//! getting them into the session here is load-bearing for security.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Order, Payment};
use crate::domain::foundation::{CourseId, OrderId, UserId};
use crate::ports::{CourseCatalog, CreateCheckoutRequest, LedgerStore, PaymentProvider};

/// Command to start a checkout.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    /// Purchasing user.
    pub user_id: UserId,

    /// Course to purchase.
    pub course_id: CourseId,

    /// Where the provider redirects after successful payment.
    pub success_url: String,

    /// Where the provider redirects after cancellation.
    pub cancel_url: String,
}

/// Result of checkout creation.
#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    /// The newly created pending order.
    pub order_id: OrderId,

    /// Provider URL for the customer to complete payment.
    pub checkout_url: String,
}

/// Handler for checkout creation.
pub struct CreateCheckoutHandler {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn CourseCatalog>,
    provider: Arc<dyn PaymentProvider>,
    currency: String,
}

impl CreateCheckoutHandler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        catalog: Arc<dyn CourseCatalog>,
        provider: Arc<dyn PaymentProvider>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            provider,
            currency: currency.into(),
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        let course = self
            .catalog
            .find_course(&cmd.course_id)
            .await?
            .filter(|c| c.is_published)
            .ok_or(BillingError::CourseNotFound(cmd.course_id))?;

        let user = self
            .catalog
            .find_user(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::validation("user_id", "Unknown user"))?;

        if let Some(enrollment) = self
            .ledger
            .find_enrollment(&cmd.user_id, &cmd.course_id)
            .await?
        {
            if enrollment.is_active {
                return Err(BillingError::already_enrolled(cmd.user_id, cmd.course_id));
            }
        }

        let mut order = Order::new(cmd.user_id, cmd.course_id, course.price_cents);

        // Provider call before any persistence: a failed call leaves no
        // dangling ledger rows.
        let session = self
            .provider
            .create_checkout_session(CreateCheckoutRequest {
                order_id: order.id,
                user_id: cmd.user_id,
                course_id: cmd.course_id,
                email: user.email,
                course_title: course.title,
                amount_cents: course.price_cents,
                currency: self.currency.to_lowercase(),
                success_url: cmd.success_url,
                cancel_url: cmd.cancel_url,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %cmd.user_id,
                    course_id = %cmd.course_id,
                    error = %e,
                    "Checkout session creation failed"
                );
                BillingError::payment_provider(e.to_string())
            })?;

        let payment = Payment::new(
            cmd.user_id,
            cmd.course_id,
            course.price_cents,
            self.currency.clone(),
            session.payment_intent_id.clone(),
        );
        order.attach_payment(payment.id);

        self.ledger.insert_payment(&payment).await?;
        self.ledger.insert_order(&order).await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %cmd.user_id,
            course_id = %cmd.course_id,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CreateCheckoutResult {
            order_id: order.id,
            checkout_url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedger;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::{Enrollment, OrderStatus, PaymentStatus};
    use crate::domain::foundation::{DomainError, Timestamp};
    use crate::ports::{CourseSummary, LedgerReader, UserProfile};
    use async_trait::async_trait;

    struct StubCatalog {
        course: Option<CourseSummary>,
        user: Option<UserProfile>,
    }

    #[async_trait]
    impl CourseCatalog for StubCatalog {
        async fn find_course(
            &self,
            _id: &CourseId,
        ) -> Result<Option<CourseSummary>, DomainError> {
            Ok(self.course.clone())
        }

        async fn find_user(&self, _id: &UserId) -> Result<Option<UserProfile>, DomainError> {
            Ok(self.user.clone())
        }
    }

    fn catalog_for(user_id: UserId, course_id: CourseId, published: bool) -> StubCatalog {
        StubCatalog {
            course: Some(CourseSummary {
                id: course_id,
                slug: "rust-basics".to_string(),
                title: "Rust Basics".to_string(),
                price_cents: 10000,
                is_published: published,
            }),
            user: Some(UserProfile {
                id: user_id,
                email: "student@example.com".to_string(),
                display_name: "Student".to_string(),
            }),
        }
    }

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        provider: Arc<MockPaymentProvider>,
        handler: CreateCheckoutHandler,
        user_id: UserId,
        course_id: CourseId,
    }

    fn fixture_with(published: bool) -> Fixture {
        let user_id = UserId::new();
        let course_id = CourseId::new();
        let ledger = Arc::new(InMemoryLedger::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let handler = CreateCheckoutHandler::new(
            ledger.clone(),
            Arc::new(catalog_for(user_id, course_id, published)),
            provider.clone(),
            "USD",
        );
        Fixture {
            ledger,
            provider,
            handler,
            user_id,
            course_id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(true)
    }

    fn cmd(f: &Fixture) -> CreateCheckoutCommand {
        CreateCheckoutCommand {
            user_id: f.user_id,
            course_id: f.course_id,
            success_url: "https://academy.example.com/checkout/return".to_string(),
            cancel_url: "https://academy.example.com/courses/rust-basics".to_string(),
        }
    }

    #[tokio::test]
    async fn creates_pending_order_and_payment() {
        let f = fixture();

        let result = f.handler.handle(cmd(&f)).await.unwrap();

        assert!(result.checkout_url.starts_with("https://"));

        let order = f.ledger.find_order(&result.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount_cents, 10000);

        let payment_id = order.payment_id.unwrap();
        let payments = f.ledger.list_payments_for_user(&f.user_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].id, payment_id);
        assert_eq!(payments[0].status, PaymentStatus::Pending);
        assert_eq!(payments[0].currency, "USD");
    }

    #[tokio::test]
    async fn session_metadata_carries_all_identifiers() {
        let f = fixture();

        let result = f.handler.handle(cmd(&f)).await.unwrap();

        let requests = f.provider.created_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].order_id, result.order_id);
        assert_eq!(requests[0].user_id, f.user_id);
        assert_eq!(requests[0].course_id, f.course_id);
        assert_eq!(requests[0].currency, "usd");
    }

    #[tokio::test]
    async fn unpublished_course_is_not_purchasable() {
        let f = fixture_with(false);

        let result = f.handler.handle(cmd(&f)).await;

        assert!(matches!(result, Err(BillingError::CourseNotFound(_))));
    }

    #[tokio::test]
    async fn active_enrollment_rejects_repurchase() {
        let f = fixture();
        f.ledger
            .insert_enrollment(Enrollment::new(f.user_id, f.course_id, Timestamp::now()))
            .await;

        let result = f.handler.handle(cmd(&f)).await;

        assert!(matches!(result, Err(BillingError::AlreadyEnrolled { .. })));
    }

    #[tokio::test]
    async fn inactive_enrollment_allows_repurchase() {
        let f = fixture();
        let mut enrollment = Enrollment::new(f.user_id, f.course_id, Timestamp::now());
        enrollment.deactivate();
        f.ledger.insert_enrollment(enrollment).await;

        let result = f.handler.handle(cmd(&f)).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn provider_failure_persists_nothing() {
        let f = fixture();
        f.provider.fail_session_create();

        let result = f.handler.handle(cmd(&f)).await;

        assert!(matches!(result, Err(BillingError::PaymentProvider(_))));
        assert!(f
            .ledger
            .list_orders_for_user(&f.user_id)
            .await
            .unwrap()
            .is_empty());
        assert!(f
            .ledger
            .list_payments_for_user(&f.user_id)
            .await
            .unwrap()
            .is_empty());
    }
}
