//! GetPaymentHistoryHandler - a user's orders and payments, newest first.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Order, Payment};
use crate::domain::foundation::UserId;
use crate::ports::LedgerReader;

/// Query for a user's purchase history.
#[derive(Debug, Clone)]
pub struct GetPaymentHistoryQuery {
    pub user_id: UserId,
}

/// A user's purchase history.
#[derive(Debug, Clone)]
pub struct PaymentHistory {
    pub orders: Vec<Order>,
    pub payments: Vec<Payment>,
}

/// Handler for the payment history page.
pub struct GetPaymentHistoryHandler {
    reader: Arc<dyn LedgerReader>,
}

impl GetPaymentHistoryHandler {
    pub fn new(reader: Arc<dyn LedgerReader>) -> Self {
        Self { reader }
    }

    pub async fn handle(
        &self,
        query: GetPaymentHistoryQuery,
    ) -> Result<PaymentHistory, BillingError> {
        let orders = self.reader.list_orders_for_user(&query.user_id).await?;
        let payments = self.reader.list_payments_for_user(&query.user_id).await?;
        Ok(PaymentHistory { orders, payments })
    }
}
