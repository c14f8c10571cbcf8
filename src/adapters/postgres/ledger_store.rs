//! PostgreSQL implementation of the ledger ports.
//!
//! The transaction scope maps directly onto a database transaction;
//! `find_order_for_update` issues `SELECT ... FOR UPDATE`, which is the
//! row-exclusive lock the completion routine's check-then-act sequence
//! requires. The enrollment upsert leans on the `(user_id, course_id)`
//! unique constraint so a cross-order race resolves to reactivation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{Enrollment, Order, OrderStatus, Payment, PaymentStatus};
use crate::domain::foundation::{
    CourseId, DomainError, ErrorCode, OrderId, PaymentId, Percentage, Timestamp, UserId,
};
use crate::ports::{LedgerStore, LedgerTx};

/// PostgreSQL implementation of the LedgerStore port.
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new store backed by the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Row Types
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount_cents: i64,
    pub status: String,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            course_id: CourseId::from_uuid(row.course_id),
            amount_cents: row.amount_cents,
            status: parse_order_status(&row.status)?,
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PaymentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_charge_id: Option<String>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            course_id: CourseId::from_uuid(row.course_id),
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: parse_payment_status(&row.status)?,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            stripe_charge_id: row.stripe_charge_id,
            payment_method: row.payment_method,
            transaction_id: row.transaction_id,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EnrollmentRow {
    user_id: Uuid,
    course_id: Uuid,
    enrolled_at: DateTime<Utc>,
    is_active: bool,
    progress: i16,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = DomainError;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        let progress = u8::try_from(row.progress)
            .ok()
            .and_then(|p| Percentage::try_new(p).ok())
            .ok_or_else(|| {
                DomainError::database(format!("Invalid progress value: {}", row.progress))
            })?;

        Ok(Enrollment {
            user_id: UserId::from_uuid(row.user_id),
            course_id: CourseId::from_uuid(row.course_id),
            enrolled_at: Timestamp::from_datetime(row.enrolled_at),
            is_active: row.is_active,
            progress,
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Status Mapping
// ════════════════════════════════════════════════════════════════════════════════

pub(crate) fn parse_order_status(s: &str) -> Result<OrderStatus, DomainError> {
    match s {
        "pending" => Ok(OrderStatus::Pending),
        "processing" => Ok(OrderStatus::Processing),
        "completed" => Ok(OrderStatus::Completed),
        "cancelled" => Ok(OrderStatus::Cancelled),
        "failed" => Ok(OrderStatus::Failed),
        _ => Err(DomainError::database(format!(
            "Invalid order status value: {}",
            s
        ))),
    }
}

pub(crate) fn order_status_to_string(status: &OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Processing => "processing",
        OrderStatus::Completed => "completed",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Failed => "failed",
    }
}

pub(crate) fn parse_payment_status(s: &str) -> Result<PaymentStatus, DomainError> {
    match s {
        "pending" => Ok(PaymentStatus::Pending),
        "completed" => Ok(PaymentStatus::Completed),
        "failed" => Ok(PaymentStatus::Failed),
        "refunded" => Ok(PaymentStatus::Refunded),
        _ => Err(DomainError::database(format!(
            "Invalid payment status value: {}",
            s
        ))),
    }
}

pub(crate) fn payment_status_to_string(status: &PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Completed => "completed",
        PaymentStatus::Failed => "failed",
        PaymentStatus::Refunded => "refunded",
    }
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("{}: {}", context, e))
}

const ORDER_COLUMNS: &str = "id, user_id, course_id, amount_cents, status, payment_id, \
                             created_at, updated_at, completed_at";

const PAYMENT_COLUMNS: &str = "id, user_id, course_id, amount_cents, currency, status, \
                               stripe_payment_intent_id, stripe_charge_id, payment_method, \
                               transaction_id, created_at, updated_at, completed_at";

// ════════════════════════════════════════════════════════════════════════════════
// Transaction Scope
// ════════════════════════════════════════════════════════════════════════════════

struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn find_order_for_update(
        &mut self,
        id: &OrderId,
    ) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to lock order", e))?;

        row.map(Order::try_from).transpose()
    }

    async fn find_payment(&mut self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to find payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payment_by_intent_for_update(
        &mut self,
        intent_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE stripe_payment_intent_id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(intent_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to lock payment by intent", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_order_by_payment(
        &mut self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE payment_id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(payment_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to find order by payment", e))?;

        row.map(Order::try_from).transpose()
    }

    async fn find_enrollment(
        &mut self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, DomainError> {
        let row: Option<EnrollmentRow> = sqlx::query_as(
            "SELECT user_id, course_id, enrolled_at, is_active, progress, completed_at \
             FROM enrollments WHERE user_id = $1 AND course_id = $2 FOR UPDATE",
        )
        .bind(user_id.as_uuid())
        .bind(course_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to find enrollment", e))?;

        row.map(Enrollment::try_from).transpose()
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_id = $3, updated_at = $4, \
             completed_at = $5 WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order_status_to_string(&order.status))
        .bind(order.payment_id.map(|p| *p.as_uuid()))
        .bind(order.updated_at.as_datetime())
        .bind(order.completed_at.map(|t| *t.as_datetime()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to update order", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::OrderNotFound, "Order not found"));
        }

        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE payments SET status = $2, stripe_payment_intent_id = $3, \
             stripe_charge_id = $4, payment_method = $5, transaction_id = $6, \
             updated_at = $7, completed_at = $8 WHERE id = $1",
        )
        .bind(payment.id.as_uuid())
        .bind(payment_status_to_string(&payment.status))
        .bind(&payment.stripe_payment_intent_id)
        .bind(&payment.stripe_charge_id)
        .bind(&payment.payment_method)
        .bind(&payment.transaction_id)
        .bind(payment.updated_at.as_datetime())
        .bind(payment.completed_at.map(|t| *t.as_datetime()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to update payment", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::PaymentNotFound,
                "Payment not found",
            ));
        }

        Ok(())
    }

    async fn upsert_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO enrollments (user_id, course_id, enrolled_at, is_active, \
             progress, completed_at) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, course_id) DO UPDATE SET is_active = EXCLUDED.is_active",
        )
        .bind(enrollment.user_id.as_uuid())
        .bind(enrollment.course_id.as_uuid())
        .bind(enrollment.enrolled_at.as_datetime())
        .bind(enrollment.is_active)
        .bind(i16::from(enrollment.progress.value()))
        .bind(enrollment.completed_at.map(|t| *t.as_datetime()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to upsert enrollment", e))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit ledger transaction", e))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Store
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin ledger transaction", e))?;
        Ok(Box::new(PostgresLedgerTx { tx }))
    }

    async fn insert_order(&self, order: &Order) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, course_id, amount_cents, status, \
             payment_id, created_at, updated_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.course_id.as_uuid())
        .bind(order.amount_cents)
        .bind(order_status_to_string(&order.status))
        .bind(order.payment_id.map(|p| *p.as_uuid()))
        .bind(order.created_at.as_datetime())
        .bind(order.updated_at.as_datetime())
        .bind(order.completed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert order", e))?;

        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO payments (id, user_id, course_id, amount_cents, currency, \
             status, stripe_payment_intent_id, stripe_charge_id, payment_method, \
             transaction_id, created_at, updated_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.course_id.as_uuid())
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment_status_to_string(&payment.status))
        .bind(&payment.stripe_payment_intent_id)
        .bind(&payment.stripe_charge_id)
        .bind(&payment.payment_method)
        .bind(&payment.transaction_id)
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .bind(payment.completed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert payment", e))?;

        Ok(())
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find order", e))?;

        row.map(Order::try_from).transpose()
    }

    async fn find_payment_by_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE stripe_payment_intent_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find payment by intent", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_order_by_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE payment_id = $1",
            ORDER_COLUMNS
        ))
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find order by payment", e))?;

        row.map(Order::try_from).transpose()
    }

    async fn find_enrollment(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, DomainError> {
        let row: Option<EnrollmentRow> = sqlx::query_as(
            "SELECT user_id, course_id, enrolled_at, is_active, progress, completed_at \
             FROM enrollments WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(course_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find enrollment", e))?;

        row.map(Enrollment::try_from).transpose()
    }
}
