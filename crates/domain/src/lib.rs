//! Domain layer for the storefront checkout core.
//!
//! This crate holds the rules that do not need a store:
//! - coupon eligibility checks and discount computation
//! - cart subtotals and line mutation
//! - customer details validation and order snapshots
//! - deterministic experiment allocation, statistics and winner selection
//!
//! Everything here is synchronous and side-effect free. The `store` and
//! `checkout` crates supply persistence and transactions.

pub mod audit;
pub mod cart;
pub mod coupon;
pub mod customer;
pub mod experiment;
pub mod order;
pub mod product;

pub use cart::{AbandonedCart, Cart, CartError, CartItem};
pub use coupon::{Coupon, CouponRejection, CouponUsage, DiscountKind, normalize_code};
pub use customer::{Address, CustomerInfo, CustomerInfoError};
pub use experiment::{
    Experiment, ExperimentPatch, ExperimentStats, Variant, VariantOutcomes, VariantStats,
    WindowDays,
};
pub use order::{Order, OrderLine, OrderNumber, PaymentStatus, PaymentStatusError};
pub use product::Product;
