//! HTTP handlers grouped by resource.

pub mod admin;
pub mod carts;
pub mod checkout;
pub mod experiments;
pub mod health;
pub mod metrics;
pub mod orders;
