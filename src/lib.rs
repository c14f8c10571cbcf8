//! Academy - Online Course Platform Backend
//!
//! This crate implements the purchase and enrollment pipeline for a course
//! platform: checkout session creation, payment-provider webhook
//! reconciliation, and course access grants.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
