//! Command and query handlers, grouped by domain area.

pub mod billing;
