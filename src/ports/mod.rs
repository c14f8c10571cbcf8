//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `LedgerStore` / `LedgerTx` - durable Order/Payment/Enrollment records
//!   with a row-locked transaction scope for the completion routine
//! - `LedgerReader` - read-side listing for payment history
//! - `CourseCatalog` - read-only course and user lookups
//!
//! ## Collaborator Ports
//!
//! - `PaymentProvider` - checkout sessions and webhook verification
//! - `Mailer` - transactional email transport

mod catalog;
mod ledger;
mod ledger_reader;
mod mailer;
mod payment_provider;

pub use catalog::{CourseCatalog, CourseSummary, UserProfile};
pub use ledger::{LedgerStore, LedgerTx};
pub use ledger_reader::LedgerReader;
pub use mailer::{EmailMessage, MailError, Mailer};
pub use payment_provider::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentErrorCode, PaymentProvider,
    ProviderSession,
};
