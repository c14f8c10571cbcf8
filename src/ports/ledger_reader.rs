//! Ledger reader port (read side).
//!
//! Listing queries for user-facing history pages. Kept separate from the
//! write-side `LedgerStore` so read models can be served from replicas or
//! denormalized views without touching the reconciliation path.

use async_trait::async_trait;

use crate::domain::billing::{Order, Payment};
use crate::domain::foundation::{DomainError, UserId};

/// Read-side queries over the ledger.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// List a user's orders, newest first.
    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, DomainError>;

    /// List a user's payments, newest first.
    async fn list_payments_for_user(&self, user_id: &UserId)
        -> Result<Vec<Payment>, DomainError>;
}
