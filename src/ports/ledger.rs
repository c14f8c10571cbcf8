//! Ledger store port - durable Order, Payment, and Enrollment records.
//!
//! The ledger is the single point of contention during payment
//! reconciliation. `LedgerStore::begin` opens a transaction scope whose
//! `find_order_for_update` takes a row-exclusive lock on the order,
//! serializing concurrent completion attempts (webhook delivery and the
//! return-page fallback can race for the same order). Writes staged inside
//! the scope become visible only on `commit`; dropping the handle without
//! committing discards them.

use async_trait::async_trait;

use crate::domain::billing::{Enrollment, Order, Payment};
use crate::domain::foundation::{CourseId, DomainError, OrderId, PaymentId, UserId};

/// Transaction scope over the ledger.
///
/// All reads inside the scope observe staged writes. Implementations must
/// guarantee that two concurrent scopes cannot both hold the lock for the
/// same order row.
#[async_trait]
pub trait LedgerTx: Send {
    /// Load an order, taking an exclusive row lock on it.
    ///
    /// The lock is held until the scope commits or is dropped.
    async fn find_order_for_update(&mut self, id: &OrderId)
        -> Result<Option<Order>, DomainError>;

    /// Load a payment by id.
    async fn find_payment(&mut self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    /// Load a payment by its provider payment-intent identifier, taking an
    /// exclusive row lock on it.
    async fn find_payment_by_intent_for_update(
        &mut self,
        intent_id: &str,
    ) -> Result<Option<Payment>, DomainError>;

    /// Load the order that references a given payment, if any.
    async fn find_order_by_payment(
        &mut self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, DomainError>;

    /// Load the enrollment for a (user, course) pair.
    async fn find_enrollment(
        &mut self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, DomainError>;

    /// Stage an order update.
    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError>;

    /// Stage a payment update.
    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError>;

    /// Stage an enrollment upsert.
    ///
    /// Implementations must be safe against the (user, course) unique
    /// constraint: a concurrent insert for the same pair resolves to
    /// reactivation, never a duplicate row.
    async fn upsert_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), DomainError>;

    /// Commit all staged writes atomically.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
}

/// Port for ledger persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction scope.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError>;

    /// Insert a new order (checkout creation).
    async fn insert_order(&self, order: &Order) -> Result<(), DomainError>;

    /// Insert a new payment (checkout creation).
    async fn insert_payment(&self, payment: &Payment) -> Result<(), DomainError>;

    /// Load an order without locking.
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, DomainError>;

    /// Load a payment by provider payment-intent id without locking.
    async fn find_payment_by_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<Payment>, DomainError>;

    /// Load the order referencing a payment without locking.
    async fn find_order_by_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, DomainError>;

    /// Load the enrollment for a (user, course) pair without locking.
    async fn find_enrollment(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, DomainError>;
}
