use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartToken, CouponId, Money, OrderId, ProductId, UserId};
use domain::{
    AbandonedCart, Cart, Coupon, CouponUsage, Experiment, Order, OrderNumber, PaymentStatus,
    Product,
};

use crate::Result;

/// Paid-order outcomes attributed to one coupon code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CouponOutcomes {
    pub paid_orders: u64,
    pub discount_total: Money,
    pub gross_revenue: Money,
}

/// Operations available inside one atomic scope.
///
/// Every write is either committed together by [`commit`](Self::commit) or
/// discarded. Dropping the transaction discards it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Loads a coupon by normalized code and locks it until the scope ends.
    async fn find_coupon_for_update(&mut self, code: &str) -> Result<Option<Coupon>>;

    async fn count_coupon_usages(&mut self, coupon_id: CouponId) -> Result<u64>;

    async fn count_user_coupon_usages(
        &mut self,
        coupon_id: CouponId,
        user_id: &UserId,
    ) -> Result<u64>;

    async fn get_product(&mut self, id: &ProductId) -> Result<Option<Product>>;

    /// Subtracts `quantity` from a stock-limited product only if at least
    /// that much is available, in a single statement.
    ///
    /// Returns the number of rows changed: 1 on success, 0 otherwise.
    async fn decrement_stock(&mut self, id: &ProductId, quantity: u32) -> Result<u64>;

    /// Next value of the order number sequence. Not rolled back on abort.
    async fn next_order_sequence(&mut self) -> Result<i64>;

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool>;

    /// Fails with [`StoreError::OrderNumberConflict`](crate::StoreError::OrderNumberConflict)
    /// if the order number is already taken.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> Result<()>;

    /// Loads an experiment definition and locks it until the scope ends.
    async fn get_experiment_for_update(&mut self, key: &str) -> Result<Option<Experiment>>;

    async fn save_experiment(&mut self, experiment: &Experiment) -> Result<()>;

    /// Returns the number of coupons changed.
    async fn set_coupon_active(&mut self, code: &str, active: bool) -> Result<u64>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// The commerce store: plain reads and writes plus [`begin`](Self::begin).
#[async_trait]
pub trait CommerceStore: Send + Sync {
    type Tx: StoreTransaction;

    /// Opens an atomic scope.
    async fn begin(&self) -> Result<Self::Tx>;

    // Carts

    async fn get_cart(&self, token: &CartToken) -> Result<Option<Cart>>;

    /// Replaces the stored lines and applied-coupon marker of a cart.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    /// Sets or clears the applied-coupon marker, creating the cart if needed.
    async fn set_applied_coupon(&self, token: &CartToken, code: Option<&str>) -> Result<()>;

    async fn mark_cart_abandoned(&self, token: &CartToken, at: DateTime<Utc>) -> Result<()>;

    /// Returns `true` if a tracked, not yet recovered cart was marked.
    async fn mark_cart_recovered(&self, token: &CartToken, at: DateTime<Utc>) -> Result<bool>;

    async fn abandoned_cart(&self, token: &CartToken) -> Result<Option<AbandonedCart>>;

    // Catalog

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    async fn upsert_product(&self, product: &Product) -> Result<()>;

    // Coupons

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>>;

    async fn coupon_usage_count(&self, coupon_id: CouponId) -> Result<u64>;

    /// Paid orders, discounts and revenue for usages of `code` since `since`.
    async fn paid_coupon_outcomes(&self, code: &str, since: DateTime<Utc>)
    -> Result<CouponOutcomes>;

    // Experiments

    async fn get_experiment(&self, key: &str) -> Result<Option<Experiment>>;

    async fn save_experiment(&self, experiment: &Experiment) -> Result<()>;

    // Orders

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn order_count(&self) -> Result<u64>;

    /// Moves an order from `from` to `to` only if it is still in `from`.
    ///
    /// Returns `false` when the order was not in `from`.
    async fn transition_payment_status(
        &self,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool>;
}
