//! Shared types for the storefront checkout core.
//!
//! Identifiers are newtypes so an order id can never be passed where a
//! coupon id is expected. Money is carried in integer minor units.

pub mod ids;
pub mod money;

pub use ids::{CartToken, CouponId, CouponUsageId, OrderId, ProductId, UserId};
pub use money::Money;
