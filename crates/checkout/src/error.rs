//! Checkout error types.

use common::{OrderId, ProductId};
use domain::{CartError, CouponRejection, CustomerInfoError, PaymentStatusError};
use event_log::EventLogError;
use serde::{Deserialize, Serialize};
use store::StoreError;
use thiserror::Error;

/// Failure of a single stock reservation.
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Insufficient stock for {product_id}: requested {requested}")]
    InsufficientStock { product_id: ProductId, requested: u32 },

    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of a coupon validation.
#[derive(Debug, Error)]
pub enum CouponCheckError {
    #[error("Coupon rejected: {0}")]
    Rejected(#[from] CouponRejection),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome category reported back to the storefront after a failed checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Stock,
    Coupon,
    AddressRequired,
    Empty,
    PaymentUnavailable,
    Error,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Stock => "stock",
            CheckoutStatus::Coupon => "coupon",
            CheckoutStatus::AddressRequired => "address_required",
            CheckoutStatus::Empty => "empty",
            CheckoutStatus::PaymentUnavailable => "payment_unavailable",
            CheckoutStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a checkout attempt or a coupon apply.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Customer details incomplete: {0}")]
    Customer(#[from] CustomerInfoError),

    #[error("Coupon is not valid: {0}")]
    Coupon(#[from] CouponRejection),

    #[error("{0}")]
    Stock(ReservationError),

    #[error("Payment is not configured")]
    PaymentNotConfigured,

    #[error("Could not allocate a unique order number after {attempts} attempts")]
    OrderNumberExhausted { attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Status the storefront uses to prompt the shopper.
    pub fn status(&self) -> CheckoutStatus {
        match self {
            CheckoutError::EmptyCart => CheckoutStatus::Empty,
            CheckoutError::Customer(_) => CheckoutStatus::AddressRequired,
            CheckoutError::Coupon(_) => CheckoutStatus::Coupon,
            CheckoutError::Stock(_) => CheckoutStatus::Stock,
            CheckoutError::PaymentNotConfigured => CheckoutStatus::PaymentUnavailable,
            CheckoutError::OrderNumberExhausted { .. } | CheckoutError::Store(_) => {
                CheckoutStatus::Error
            }
        }
    }

    /// True for outcomes the shopper can fix and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.status(),
            CheckoutStatus::Stock
                | CheckoutStatus::Coupon
                | CheckoutStatus::AddressRequired
                | CheckoutStatus::Empty
        )
    }
}

impl From<ReservationError> for CheckoutError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Store(e) => CheckoutError::Store(e),
            other => CheckoutError::Stock(other),
        }
    }
}

impl From<CouponCheckError> for CheckoutError {
    fn from(err: CouponCheckError) -> Self {
        match err {
            CouponCheckError::Rejected(r) => CheckoutError::Coupon(r),
            CouponCheckError::Store(e) => CheckoutError::Store(e),
        }
    }
}

/// Errors from experiment allocation, statistics and administration.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Experiment not found: {0}")]
    NotFound(String),

    #[error("No winner for experiment {key}: variants are tied")]
    NoWinner { key: String },

    #[error("Experiment {key} changed during promotion: expected version {expected}, found {found}")]
    VersionMismatch {
        key: String,
        expected: i64,
        found: i64,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),
}

/// Errors from cart mutations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from order reads and payment status changes.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error(transparent)]
    InvalidTransition(#[from] PaymentStatusError),

    #[error("Order {0} changed concurrently")]
    Conflict(OrderId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
