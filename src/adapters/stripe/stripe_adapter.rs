//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port against the Stripe REST API:
//! checkout session creation and retrieval, plus webhook verification.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::billing::{
    ProviderEvent, ProviderEventKind, ProviderPaymentStatus, SessionMetadata,
};
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentProvider, ProviderSession,
};

use super::webhook_types::{
    hex_encode, SignatureHeader, StripeCheckoutSession, StripePaymentIntent, StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test-mode events (production deployments).
    require_livemode: bool,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    /// Create a new Stripe adapter with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Verify webhook signature using HMAC-SHA256.
    ///
    /// # Security
    ///
    /// - Uses constant-time comparison to prevent timing attacks
    /// - Validates timestamp to prevent replay attacks
    fn verify_signature(
        &self,
        payload: &[u8],
        header: &SignatureHeader,
    ) -> Result<(), PaymentError> {
        // 1. Validate timestamp (prevent replay attacks)
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                age_secs = age,
                "Webhook event too old - possible replay attack"
            );
            return Err(PaymentError::invalid_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                "Webhook event from future - clock skew or manipulation"
            );
            return Err(PaymentError::invalid_webhook("Event timestamp in future"));
        }

        // 2. Compute expected signature
        let signed_payload = format!(
            "{}.{}",
            header.timestamp,
            String::from_utf8_lossy(payload)
        );

        let mut mac = HmacSha256::new_from_slice(
            self.config.webhook_secret.expose_secret().as_bytes(),
        )
        .expect("HMAC can take key of any size");

        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();

        // 3. Constant-time comparison
        let expected_bytes: &[u8] = expected.as_slice();
        let provided_bytes: &[u8] = &header.v1_signature;

        if expected_bytes.len() != provided_bytes.len()
            || expected_bytes.ct_eq(provided_bytes).unwrap_u8() != 1
        {
            tracing::warn!(
                expected_signature = hex_encode(expected_bytes),
                "Invalid webhook signature"
            );
            return Err(PaymentError::invalid_webhook("Invalid signature"));
        }

        Ok(())
    }

    /// Parse a verified Stripe payload into the normalized event.
    fn parse_event(&self, payload: &[u8]) -> Result<ProviderEvent, PaymentError> {
        let stripe_event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            PaymentError::invalid_webhook(format!("Invalid JSON: {}", e))
        })?;

        if self.config.require_livemode && !stripe_event.livemode {
            tracing::warn!(
                event_id = %stripe_event.id,
                "Rejected test mode event in production"
            );
            return Err(PaymentError::invalid_webhook(
                "Test mode events not allowed in production",
            ));
        }

        let kind = ProviderEventKind::from_event_type(&stripe_event.event_type);

        let mut event = ProviderEvent {
            id: stripe_event.id.clone(),
            kind: kind.clone(),
            order_id: None,
            user_id: None,
            course_id: None,
            payment_status: None,
            payment_intent_id: None,
            created_at: stripe_event.created,
        };

        match kind {
            ProviderEventKind::CheckoutCompleted => {
                let session: StripeCheckoutSession =
                    serde_json::from_value(stripe_event.data.object).map_err(|e| {
                        PaymentError::invalid_webhook(format!("Invalid checkout session: {}", e))
                    })?;

                event.payment_status =
                    Some(ProviderPaymentStatus::from_provider(&session.payment_status));
                event.payment_intent_id = session.payment_intent;
                event = event.with_metadata(SessionMetadata::from_map(&session.metadata));
            }
            ProviderEventKind::PaymentSucceeded | ProviderEventKind::PaymentFailed => {
                let intent: StripePaymentIntent =
                    serde_json::from_value(stripe_event.data.object).map_err(|e| {
                        PaymentError::invalid_webhook(format!("Invalid payment intent: {}", e))
                    })?;

                // Intent metadata carries the identifiers only when the
                // session was created with payment_intent_data; best-effort.
                let metadata = SessionMetadata::from_map(&intent.metadata);
                event.payment_intent_id = Some(intent.id);
                event = event.with_metadata(metadata);
            }
            ProviderEventKind::Unknown(_) => {}
        }

        Ok(event)
    }

    fn session_to_provider_session(session: StripeCheckoutSession) -> ProviderSession {
        ProviderSession {
            payment_status: ProviderPaymentStatus::from_provider(&session.payment_status),
            payment_intent_id: session.payment_intent,
            metadata: SessionMetadata::from_map(&session.metadata),
            id: session.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        // The provider substitutes {CHECKOUT_SESSION_ID} on redirect; the
        // order id rides along so the return page knows what to reconcile.
        let success_url = format!(
            "{}?session_id={{CHECKOUT_SESSION_ID}}&order_id={}",
            request.success_url, request.order_id
        );

        let amount = request.amount_cents.to_string();
        let order_id = request.order_id.to_string();
        let user_id = request.user_id.to_string();
        let course_id = request.course_id.to_string();

        let params: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", &request.currency),
            ("line_items[0][price_data][unit_amount]", &amount),
            (
                "line_items[0][price_data][product_data][name]",
                &request.course_title,
            ),
            ("customer_email", &request.email),
            ("success_url", &success_url),
            ("cancel_url", &request.cancel_url),
            ("metadata[order_id]", &order_id),
            ("metadata[user_id]", &user_id),
            ("metadata[course_id]", &course_id),
            // Mirror the identifiers onto the payment intent so
            // payment_intent.* events can be correlated without a session.
            ("payment_intent_data[metadata][order_id]", &order_id),
            ("payment_intent_data[metadata][user_id]", &user_id),
            ("payment_intent_data[metadata][course_id]", &course_id),
        ];

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<StripeErrorResponse>(&error_text)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(error_text);
            tracing::error!(error = %detail, "Stripe create_checkout_session failed");
            return Err(PaymentError::provider(format!("Stripe API error: {}", detail)));
        }

        let session: StripeCheckoutSession = response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })?;

        let checkout_url = session.url.ok_or_else(|| {
            PaymentError::provider("Checkout session response carried no URL")
        })?;

        Ok(CheckoutSession {
            id: session.id,
            url: checkout_url,
            payment_intent_id: session.payment_intent,
            expires_at: session.expires_at.unwrap_or(0),
        })
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ProviderSession>, PaymentError> {
        let url = format!(
            "{}/v1/checkout/sessions/{}",
            self.config.api_base_url, session_id
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<StripeErrorResponse>(&error_text)
                .ok()
                .and_then(|e| e.error.message.or(e.error.error_type))
                .unwrap_or(error_text);
            return Err(PaymentError::provider(format!("Stripe API error: {}", detail)));
        }

        let session: StripeCheckoutSession = response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })?;

        Ok(Some(Self::session_to_provider_session(session)))
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ProviderEvent, PaymentError> {
        let header = SignatureHeader::parse(signature)
            .map_err(|e| PaymentError::invalid_webhook(e.to_string()))?;

        self.verify_signature(payload, &header)?;

        self.parse_event(payload)
    }
}

/// Computes a valid signature header for test fixtures.
#[cfg(test)]
pub fn compute_test_signature(secret: &str, timestamp: i64, payload: &str) -> String {
    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex_encode(&mac.finalize().into_bytes())
}
