//! In-memory implementation of the ledger ports.
//!
//! Backs unit and scenario tests, and can serve local development without a
//! database. Transaction scopes hold an owned async mutex guard over the
//! whole ledger, which serializes at coarser granularity than the SQL
//! adapter's row lock but provides the same guarantee the completion
//! routine relies on: two scopes can never both observe the same order as
//! not-yet-completed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::billing::{Enrollment, Order, Payment};
use crate::domain::foundation::{
    CourseId, DomainError, ErrorCode, OrderId, PaymentId, UserId,
};
use crate::ports::{LedgerReader, LedgerStore, LedgerTx};

#[derive(Default)]
struct LedgerState {
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    enrollments: HashMap<(UserId, CourseId), Enrollment>,
}

/// In-memory ledger store.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an enrollment directly (test/dev setup).
    pub async fn insert_enrollment(&self, enrollment: Enrollment) {
        let mut state = self.state.lock().await;
        state.enrollments.insert(
            (enrollment.user_id, enrollment.course_id),
            enrollment,
        );
    }

    /// Count enrollment rows (test assertions).
    pub async fn enrollment_count(&self) -> usize {
        self.state.lock().await.enrollments.len()
    }
}

#[derive(Default)]
struct StagedWrites {
    orders: Vec<Order>,
    payments: Vec<Payment>,
    enrollments: Vec<Enrollment>,
}

struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    staged: StagedWrites,
}

impl InMemoryLedgerTx {
    fn staged_order(&self, id: &OrderId) -> Option<&Order> {
        self.staged.orders.iter().rev().find(|o| &o.id == id)
    }

    fn staged_payment(&self, id: &PaymentId) -> Option<&Payment> {
        self.staged.payments.iter().rev().find(|p| &p.id == id)
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn find_order_for_update(
        &mut self,
        id: &OrderId,
    ) -> Result<Option<Order>, DomainError> {
        if let Some(order) = self.staged_order(id) {
            return Ok(Some(order.clone()));
        }
        Ok(self.guard.orders.get(id).cloned())
    }

    async fn find_payment(&mut self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        if let Some(payment) = self.staged_payment(id) {
            return Ok(Some(payment.clone()));
        }
        Ok(self.guard.payments.get(id).cloned())
    }

    async fn find_payment_by_intent_for_update(
        &mut self,
        intent_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        if let Some(payment) = self
            .staged
            .payments
            .iter()
            .rev()
            .find(|p| p.stripe_payment_intent_id.as_deref() == Some(intent_id))
        {
            return Ok(Some(payment.clone()));
        }
        Ok(self
            .guard
            .payments
            .values()
            .find(|p| p.stripe_payment_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn find_order_by_payment(
        &mut self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, DomainError> {
        if let Some(order) = self
            .staged
            .orders
            .iter()
            .rev()
            .find(|o| o.payment_id.as_ref() == Some(payment_id))
        {
            return Ok(Some(order.clone()));
        }
        Ok(self
            .guard
            .orders
            .values()
            .find(|o| o.payment_id.as_ref() == Some(payment_id))
            .cloned())
    }

    async fn find_enrollment(
        &mut self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, DomainError> {
        if let Some(enrollment) = self
            .staged
            .enrollments
            .iter()
            .rev()
            .find(|e| &e.user_id == user_id && &e.course_id == course_id)
        {
            return Ok(Some(enrollment.clone()));
        }
        Ok(self
            .guard
            .enrollments
            .get(&(*user_id, *course_id))
            .cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        if !self.guard.orders.contains_key(&order.id) {
            return Err(DomainError::new(
                ErrorCode::OrderNotFound,
                "Order not found",
            ));
        }
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        if !self.guard.payments.contains_key(&payment.id) {
            return Err(DomainError::new(
                ErrorCode::PaymentNotFound,
                "Payment not found",
            ));
        }
        self.staged.payments.push(payment.clone());
        Ok(())
    }

    async fn upsert_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), DomainError> {
        self.staged.enrollments.push(enrollment.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DomainError> {
        let staged = std::mem::take(&mut self.staged);
        for order in staged.orders {
            self.guard.orders.insert(order.id, order);
        }
        for payment in staged.payments {
            self.guard.payments.insert(payment.id, payment);
        }
        for enrollment in staged.enrollments {
            self.guard
                .enrollments
                .insert((enrollment.user_id, enrollment.course_id), enrollment);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, DomainError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(InMemoryLedgerTx {
            guard,
            staged: StagedWrites::default(),
        }))
    }

    async fn insert_order(&self, order: &Order) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(DomainError::database("Duplicate order id"));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;
        if state.payments.contains_key(&payment.id) {
            return Err(DomainError::database("Duplicate payment id"));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.state.lock().await.orders.get(id).cloned())
    }

    async fn find_payment_by_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .values()
            .find(|p| p.stripe_payment_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn find_order_by_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .values()
            .find(|o| o.payment_id.as_ref() == Some(payment_id))
            .cloned())
    }

    async fn find_enrollment(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .enrollments
            .get(&(*user_id, *course_id))
            .cloned())
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn list_orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, DomainError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| &o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_payments_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Payment>, DomainError> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}
