//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port against the Stripe REST API,
//! including HMAC-SHA256 webhook signature verification. A configurable
//! mock implementation backs tests and local development.

mod mock_payment_provider;
mod stripe_adapter;
mod webhook_types;

pub use mock_payment_provider::MockPaymentProvider;
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
pub use webhook_types::{SignatureHeader, SignatureParseError};
