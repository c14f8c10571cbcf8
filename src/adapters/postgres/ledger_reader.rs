//! PostgreSQL implementation of the LedgerReader port.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::{Order, Payment};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::LedgerReader;

use super::ledger_store::{OrderRow, PaymentRow};

/// PostgreSQL read-side listing over the ledger.
pub struct PostgresLedgerReader {
    pool: PgPool,
}

impl PostgresLedgerReader {
    /// Creates a new reader backed by the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerReader for PostgresLedgerReader {
    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, DomainError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, user_id, course_id, amount_cents, status, payment_id, \
             created_at, updated_at, completed_at \
             FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list orders: {}", e)))?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_payments_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            "SELECT id, user_id, course_id, amount_cents, currency, status, \
             stripe_payment_intent_id, stripe_charge_id, payment_method, \
             transaction_id, created_at, updated_at, completed_at \
             FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list payments: {}", e)))?;

        rows.into_iter().map(Payment::try_from).collect()
    }
}
