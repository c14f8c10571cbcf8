//! HTTP surface for the billing flows.

mod dto;
mod handlers;
mod routes;

pub use handlers::{AuthenticatedUser, BillingAppState};
pub use routes::billing_router;
