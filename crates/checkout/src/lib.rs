//! Checkout and promotion services.
//!
//! A checkout attempt runs through these steps:
//! 1. Validate the customer details and the cart outside the atomic scope
//! 2. Inside one store transaction: re-validate the applied coupon, reserve
//!    stock line by line, generate an order number, write the order and its
//!    coupon usage
//! 3. After commit, best effort: clear the coupon marker, mark an abandoned
//!    cart recovered, record checkout and experiment events
//!
//! Any failure in step 2 drops the transaction, so nothing partial persists.

pub mod carts;
pub mod clock;
pub mod coupons;
pub mod error;
pub mod experiments;
pub mod order_number;
pub mod orchestrator;
pub mod orders;
pub mod stock;

pub use carts::CartService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use coupons::{CouponValidator, ValidatedCoupon};
pub use error::{
    CartServiceError, CheckoutError, CheckoutStatus, CouponCheckError, ExperimentError,
    OrderError, ReservationError,
};
pub use experiments::{Assignment, ExperimentAllocator, ExperimentReport};
pub use order_number::OrderNumberGenerator;
pub use orchestrator::{
    AppliedCoupon, CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest, CheckoutSettings,
    PaymentMode,
};
pub use orders::OrderService;
pub use stock::StockLedger;
