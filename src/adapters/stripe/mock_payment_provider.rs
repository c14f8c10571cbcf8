//! Configurable in-process payment provider.
//!
//! Stands in for Stripe in tests and local development. Webhook
//! verification pops pre-queued normalized events; session fetches read a
//! configurable session map; every failure mode can be toggled.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::billing::ProviderEvent;
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentProvider, ProviderSession,
};

/// Mock payment provider with scriptable behavior.
#[derive(Default)]
pub struct MockPaymentProvider {
    events: Mutex<VecDeque<ProviderEvent>>,
    sessions: Mutex<HashMap<String, ProviderSession>>,
    created: Mutex<Vec<CreateCheckoutRequest>>,
    fail_verification: AtomicBool,
    fail_session_create: AtomicBool,
    fail_session_fetch: AtomicBool,
    session_fetches: AtomicU32,
}

impl MockPaymentProvider {
    /// Creates a mock with no queued events or sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a normalized event for the next `verify_webhook` call.
    pub fn push_event(&self, event: ProviderEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    /// Register a session for `get_checkout_session` lookups.
    pub fn insert_session(&self, session: ProviderSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    /// Make all subsequent verifications fail.
    pub fn fail_verification(&self) {
        self.fail_verification.store(true, Ordering::SeqCst);
    }

    /// Make all subsequent session creations fail.
    pub fn fail_session_create(&self) {
        self.fail_session_create.store(true, Ordering::SeqCst);
    }

    /// Make all subsequent session fetches fail.
    pub fn fail_session_fetch(&self) {
        self.fail_session_fetch.store(true, Ordering::SeqCst);
    }

    /// Checkout requests seen so far.
    pub fn created_requests(&self) -> Vec<CreateCheckoutRequest> {
        self.created.lock().unwrap().clone()
    }

    /// Number of session fetches attempted.
    pub fn session_fetch_count(&self) -> u32 {
        self.session_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if self.fail_session_create.load(Ordering::SeqCst) {
            return Err(PaymentError::provider("Simulated session creation failure"));
        }

        let mut created = self.created.lock().unwrap();
        let n = created.len() + 1;
        created.push(request);

        Ok(CheckoutSession {
            id: format!("cs_mock_{}", n),
            url: format!("https://checkout.stripe.com/pay/cs_mock_{}", n),
            payment_intent_id: None,
            expires_at: chrono::Utc::now().timestamp() + 86_400,
        })
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ProviderSession>, PaymentError> {
        self.session_fetches.fetch_add(1, Ordering::SeqCst);

        if self.fail_session_fetch.load(Ordering::SeqCst) {
            return Err(PaymentError::network("Simulated session fetch failure"));
        }

        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn verify_webhook(
        &self,
        _payload: &[u8],
        _signature: &str,
    ) -> Result<ProviderEvent, PaymentError> {
        if self.fail_verification.load(Ordering::SeqCst) {
            return Err(PaymentError::invalid_webhook("Simulated invalid signature"));
        }

        self.events
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PaymentError::invalid_webhook("No event queued"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{ProviderEventKind, ProviderPaymentStatus, SessionMetadata};
    use crate::domain::foundation::{CourseId, OrderId, UserId};

    fn request() -> CreateCheckoutRequest {
        CreateCheckoutRequest {
            order_id: OrderId::new(),
            user_id: UserId::new(),
            course_id: CourseId::new(),
            email: "student@example.com".to_string(),
            course_title: "Course".to_string(),
            amount_cents: 10000,
            currency: "usd".to_string(),
            success_url: "https://a.example/return".to_string(),
            cancel_url: "https://a.example/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn create_session_records_request() {
        let mock = MockPaymentProvider::new();

        let session = mock.create_checkout_session(request()).await.unwrap();

        assert!(session.url.contains(&session.id));
        assert_eq!(mock.created_requests().len(), 1);
    }

    #[tokio::test]
    async fn verify_pops_events_in_order() {
        let mock = MockPaymentProvider::new();
        for id in ["evt_1", "evt_2"] {
            mock.push_event(ProviderEvent {
                id: id.to_string(),
                kind: ProviderEventKind::CheckoutCompleted,
                order_id: None,
                user_id: None,
                course_id: None,
                payment_status: Some(ProviderPaymentStatus::Paid),
                payment_intent_id: None,
                created_at: 0,
            });
        }

        let first = mock.verify_webhook(b"{}", "sig").await.unwrap();
        let second = mock.verify_webhook(b"{}", "sig").await.unwrap();

        assert_eq!(first.id, "evt_1");
        assert_eq!(second.id, "evt_2");
        assert!(mock.verify_webhook(b"{}", "sig").await.is_err());
    }

    #[tokio::test]
    async fn session_lookup_and_failure_toggle() {
        let mock = MockPaymentProvider::new();
        mock.insert_session(ProviderSession {
            id: "cs_1".to_string(),
            payment_status: ProviderPaymentStatus::Paid,
            payment_intent_id: Some("pi_1".to_string()),
            metadata: SessionMetadata::default(),
        });

        let found = mock.get_checkout_session("cs_1").await.unwrap();
        assert!(found.is_some());
        let missing = mock.get_checkout_session("cs_other").await.unwrap();
        assert!(missing.is_none());

        mock.fail_session_fetch();
        assert!(mock.get_checkout_session("cs_1").await.is_err());
        assert_eq!(mock.session_fetch_count(), 3);
    }
}
