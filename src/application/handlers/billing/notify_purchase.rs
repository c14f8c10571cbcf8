//! PurchaseNotifier - best-effort purchase confirmation email.
//!
//! Strictly decoupled from the correctness-critical completion path: every
//! failure (lookup, rendering, transport) is logged with context and
//! swallowed. Order completion must never roll back or fail because an
//! email did not go out.

use std::sync::Arc;

use crate::domain::billing::Order;
use crate::ports::{CourseCatalog, CourseSummary, EmailMessage, Mailer, UserProfile};

/// Builds and sends purchase confirmation messages.
pub struct PurchaseNotifier {
    catalog: Arc<dyn CourseCatalog>,
    mailer: Arc<dyn Mailer>,
    public_base_url: String,
}

impl PurchaseNotifier {
    pub fn new(
        catalog: Arc<dyn CourseCatalog>,
        mailer: Arc<dyn Mailer>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            mailer,
            public_base_url: public_base_url.into(),
        }
    }

    /// Send the confirmation for a just-completed order.
    ///
    /// Infallible by contract; the return value only says whether a message
    /// was actually handed to the transport (used by tests).
    pub async fn purchase_confirmed(&self, order: &Order) -> bool {
        let message = match self.build_message(order).await {
            Some(message) => message,
            None => return false,
        };

        match self.mailer.send(&message).await {
            Ok(()) => {
                tracing::info!(
                    order_id = %order.id,
                    recipient = %message.to,
                    "Purchase confirmation sent"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    course_id = %order.course_id,
                    error = %e,
                    "Failed to send purchase confirmation"
                );
                false
            }
        }
    }

    async fn build_message(&self, order: &Order) -> Option<EmailMessage> {
        let user = match self.catalog.find_user(&order.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::error!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    "Cannot send confirmation: user not found"
                );
                return None;
            }
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "User lookup failed");
                return None;
            }
        };

        let course = match self.catalog.find_course(&order.course_id).await {
            Ok(Some(course)) => course,
            Ok(None) => {
                tracing::error!(
                    order_id = %order.id,
                    course_id = %order.course_id,
                    "Cannot send confirmation: course not found"
                );
                return None;
            }
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Course lookup failed");
                return None;
            }
        };

        Some(self.render(order, &user, &course))
    }

    fn render(&self, order: &Order, user: &UserProfile, course: &CourseSummary) -> EmailMessage {
        let course_url = format!(
            "{}/courses/{}",
            self.public_base_url.trim_end_matches('/'),
            course.slug
        );
        let amount = format_amount(order.amount_cents);
        let purchased = order.completed_at.unwrap_or(order.updated_at);
        let purchased_at = purchased.as_datetime().format("%Y-%m-%d %H:%M UTC");

        let subject = format!("Purchase confirmation - {}", course.title);
        let html_body = format!(
            "<h1>Thank you for your purchase, {name}!</h1>\
             <p>You now have full access to <strong>{title}</strong>.</p>\
             <p>Amount paid: {amount}<br>Date: {purchased_at}</p>\
             <p><a href=\"{course_url}\">Start learning</a></p>",
            name = user.display_name,
            title = course.title,
        );
        let text_body = format!(
            "Thank you for your purchase, {name}!\n\n\
             You now have full access to {title}.\n\
             Amount paid: {amount}\n\
             Date: {purchased_at}\n\n\
             Start learning: {course_url}\n",
            name = user.display_name,
            title = course.title,
        );

        EmailMessage {
            to: user.email.clone(),
            subject,
            html_body,
            text_body,
        }
    }
}

/// Format cents as a decimal amount, e.g. 10000 -> "100.00 USD".
fn format_amount(cents: i64) -> String {
    format!("{}.{:02} USD", cents / 100, (cents % 100).abs())
}
