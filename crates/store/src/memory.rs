use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartToken, CouponId, OrderId, ProductId, UserId};
use domain::{
    AbandonedCart, Cart, Coupon, CouponUsage, Experiment, Order, OrderNumber, PaymentStatus,
    Product,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{CommerceStore, CouponOutcomes, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartToken, Cart>,
    abandoned: HashMap<CartToken, AbandonedCart>,
    coupons: HashMap<String, Coupon>,
    usages: Vec<CouponUsage>,
    orders: HashMap<OrderId, Order>,
    experiments: HashMap<String, Experiment>,
    order_sequence: i64,
}

impl MemoryState {
    fn coupon_by_id(&self, id: CouponId) -> Option<&Coupon> {
        self.coupons.values().find(|c| c.id == id)
    }
}

/// In-memory commerce store for tests and the database-less dev server.
///
/// A transaction holds the whole store lock and works on a staged copy, so
/// transactions are fully serialized and an uncommitted scope leaves no
/// trace.
#[derive(Clone, Default)]
pub struct InMemoryCommerceStore {
    state: Arc<Mutex<MemoryState>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent commit fail until reset.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns all recorded coupon usages.
    pub async fn coupon_usages(&self) -> Vec<CouponUsage> {
        self.state.lock().await.usages.clone()
    }
}

/// Atomic scope over [`InMemoryCommerceStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_on_commit: bool,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_coupon_for_update(&mut self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.staged.coupons.get(code).cloned())
    }

    async fn count_coupon_usages(&mut self, coupon_id: CouponId) -> Result<u64> {
        Ok(self
            .staged
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id)
            .count() as u64)
    }

    async fn count_user_coupon_usages(
        &mut self,
        coupon_id: CouponId,
        user_id: &UserId,
    ) -> Result<u64> {
        Ok(self
            .staged
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id && u.user_id.as_ref() == Some(user_id))
            .count() as u64)
    }

    async fn get_product(&mut self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.staged.products.get(id).cloned())
    }

    async fn decrement_stock(&mut self, id: &ProductId, quantity: u32) -> Result<u64> {
        match self.staged.products.get_mut(id) {
            Some(p) if p.stock_limited && p.available_quantity >= quantity => {
                p.available_quantity -= quantity;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn next_order_sequence(&mut self) -> Result<i64> {
        // Written through to the live state, like a database sequence.
        self.guard.order_sequence += 1;
        self.staged.order_sequence = self.guard.order_sequence;
        Ok(self.guard.order_sequence)
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool> {
        Ok(self
            .staged
            .orders
            .values()
            .any(|o| &o.order_number == number))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.order_number_exists(&order.order_number).await? {
            return Err(StoreError::OrderNumberConflict(
                order.order_number.to_string(),
            ));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> Result<()> {
        if self.staged.coupon_by_id(usage.coupon_id).is_none() {
            return Err(StoreError::not_found("coupon", usage.coupon_id));
        }
        if !self.staged.orders.contains_key(&usage.order_id) {
            return Err(StoreError::not_found("order", usage.order_id));
        }
        self.staged.usages.push(usage.clone());
        Ok(())
    }

    async fn get_experiment_for_update(&mut self, key: &str) -> Result<Option<Experiment>> {
        Ok(self.staged.experiments.get(key).cloned())
    }

    async fn save_experiment(&mut self, experiment: &Experiment) -> Result<()> {
        self.staged
            .experiments
            .insert(experiment.key.clone(), experiment.clone());
        Ok(())
    }

    async fn set_coupon_active(&mut self, code: &str, active: bool) -> Result<u64> {
        match self.staged.coupons.get_mut(code) {
            Some(coupon) => {
                coupon.is_active = active;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn commit(mut self) -> Result<()> {
        if self.fail_on_commit {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CommerceStore for InMemoryCommerceStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let staged = (*guard).clone();
        Ok(InMemoryTransaction {
            guard,
            staged,
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
        })
    }

    async fn get_cart(&self, token: &CartToken) -> Result<Option<Cart>> {
        Ok(self.state.lock().await.carts.get(token).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state
            .lock()
            .await
            .carts
            .insert(cart.token.clone(), cart.clone());
        Ok(())
    }

    async fn set_applied_coupon(&self, token: &CartToken, code: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().await;
        let cart = state
            .carts
            .entry(token.clone())
            .or_insert_with(|| Cart::new(token.clone()));
        cart.applied_coupon = code.map(str::to_string);
        Ok(())
    }

    async fn mark_cart_abandoned(&self, token: &CartToken, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .carts
            .entry(token.clone())
            .or_insert_with(|| Cart::new(token.clone()));
        state.abandoned.insert(
            token.clone(),
            AbandonedCart {
                token: token.clone(),
                tracked_at: at,
                recovered_at: None,
            },
        );
        Ok(())
    }

    async fn mark_cart_recovered(&self, token: &CartToken, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.abandoned.get_mut(token) {
            Some(tracked) if tracked.recovered_at.is_none() => {
                tracked.recovered_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn abandoned_cart(&self, token: &CartToken) -> Result<Option<AbandonedCart>> {
        Ok(self.state.lock().await.abandoned.get(token).cloned())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.state
            .lock()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.coupons.contains_key(&coupon.code) {
            return Err(StoreError::InvalidData(format!(
                "duplicate coupon code {}",
                coupon.code
            )));
        }
        state.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.get(code).cloned())
    }

    async fn coupon_usage_count(&self, coupon_id: CouponId) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .await
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id)
            .count() as u64)
    }

    async fn paid_coupon_outcomes(
        &self,
        code: &str,
        since: DateTime<Utc>,
    ) -> Result<CouponOutcomes> {
        let state = self.state.lock().await;
        let Some(coupon) = state.coupons.get(code) else {
            return Ok(CouponOutcomes::default());
        };

        let mut outcomes = CouponOutcomes::default();
        for usage in state
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon.id && u.created_at >= since)
        {
            let Some(order) = state.orders.get(&usage.order_id) else {
                continue;
            };
            if order.payment_status != PaymentStatus::Paid {
                continue;
            }
            outcomes.paid_orders += 1;
            outcomes.discount_total += usage.discount_amount;
            outcomes.gross_revenue += order.total_amount;
        }
        Ok(outcomes)
    }

    async fn get_experiment(&self, key: &str) -> Result<Option<Experiment>> {
        Ok(self.state.lock().await.experiments.get(key).cloned())
    }

    async fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.state
            .lock()
            .await
            .experiments
            .insert(experiment.key.clone(), experiment.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn order_count(&self) -> Result<u64> {
        Ok(self.state.lock().await.orders.len() as u64)
    }

    async fn transition_payment_status(
        &self,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(&id) {
            Some(order) if order.payment_status == from => {
                order.payment_status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("order", id)),
        }
    }
}
