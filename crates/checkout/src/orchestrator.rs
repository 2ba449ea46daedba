//! Checkout transaction orchestrator.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{CartToken, Money, OrderId, UserId};
use domain::audit::{actions, entities};
use domain::{
    Cart, CouponRejection, CouponUsage, CustomerInfo, Order, OrderNumber, Variant, normalize_code,
};
use event_log::{EventRecord, EventRecorder, EventRecorderExt};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, StoreError, StoreTransaction};

use crate::clock::Clock;
use crate::coupons::CouponValidator;
use crate::error::{CheckoutError, CouponCheckError, ExperimentError};
use crate::experiments::{Assignment, ExperimentAllocator};
use crate::order_number::OrderNumberGenerator;
use crate::stock::StockLedger;

/// How orders get paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMode {
    /// Orders start `pending` and are settled later.
    Offline,
    /// An external gateway; unusable without its URL.
    Gateway { url: Option<String> },
}

/// Deployment settings the orchestrator needs.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub experiment_key: String,
    pub order_number_prefix: String,
    pub order_number_attempts: u32,
    pub payment: PaymentMode,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            experiment_key: "checkout_promo".to_string(),
            order_number_prefix: "ORD".to_string(),
            order_number_attempts: OrderNumberGenerator::DEFAULT_MAX_ATTEMPTS,
            payment: PaymentMode::Offline,
        }
    }
}

/// A submitted checkout.
///
/// Without an explicit `coupon_code` the cart's applied-coupon marker is used.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub cart_token: CartToken,
    pub customer: CustomerInfo,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// What a successful checkout returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub subtotal: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub coupon_code: Option<String>,
    pub variant: Option<Variant>,
}

/// Result of applying a coupon to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub subtotal: Money,
    pub discount: Money,
    pub variant: Option<Variant>,
}

/// Turns carts into orders.
///
/// Coupon validation, stock reservations, order number generation and the
/// order and usage writes run inside one store transaction. Event writes and
/// cart bookkeeping happen outside it and never undo a committed order.
pub struct CheckoutOrchestrator<S, R> {
    store: S,
    recorder: R,
    validator: CouponValidator,
    ledger: StockLedger,
    order_numbers: OrderNumberGenerator,
    experiments: ExperimentAllocator<S, R>,
    clock: Arc<dyn Clock>,
    settings: CheckoutSettings,
}

impl<S, R> CheckoutOrchestrator<S, R>
where
    S: CommerceStore + Clone,
    R: EventRecorder + Clone,
{
    pub fn new(store: S, recorder: R, clock: Arc<dyn Clock>, settings: CheckoutSettings) -> Self {
        Self {
            validator: CouponValidator::new(clock.clone()),
            ledger: StockLedger::new(),
            order_numbers: OrderNumberGenerator::new(settings.order_number_prefix.clone())
                .with_max_attempts(settings.order_number_attempts),
            experiments: ExperimentAllocator::new(store.clone(), recorder.clone(), clock.clone()),
            store,
            recorder,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    pub fn experiments(&self) -> &ExperimentAllocator<S, R> {
        &self.experiments
    }

    /// Places an order for the cart.
    #[tracing::instrument(skip(self, request), fields(cart = %request.cart_token))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt, CheckoutError> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();
        let token = request.cart_token.clone();

        let result = self.run_checkout(request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %receipt.order_id,
                    order_number = %receipt.order_number,
                    total = %receipt.total_amount,
                    "checkout completed"
                );
            }
            Err(err) => {
                let status = err.status();
                metrics::counter!("checkout_failed_total", "status" => status.as_str())
                    .increment(1);
                if err.is_recoverable() {
                    tracing::info!(%status, reason = %err, "checkout rejected");
                } else {
                    tracing::error!(%status, error = %err, "checkout failed");
                }

                let event = EventRecord::new(actions::CHECKOUT_FAILED, entities::CART, token.as_str())
                    .actor(token.as_str())
                    .payload(serde_json::json!({
                        "status": status,
                        "reason": err.to_string(),
                    }))
                    .at(self.clock.now());
                self.recorder.record_best_effort(event).await;
            }
        }
        result
    }

    async fn run_checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt, CheckoutError> {
        let CheckoutRequest {
            cart_token,
            customer,
            coupon_code,
        } = request;

        customer.validate()?;
        let cart = self
            .store
            .get_cart(&cart_token)
            .await?
            .filter(|c| !c.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;
        self.ensure_payment_configured()?;

        let coupon_code = coupon_code
            .or_else(|| cart.applied_coupon.clone())
            .map(|c| normalize_code(&c))
            .filter(|c| !c.is_empty());
        let assignment = self.resolve_assignment(&cart_token).await;

        let started = EventRecord::new(actions::CHECKOUT_STARTED, entities::CART, cart_token.as_str())
            .actor(cart_token.as_str())
            .payload(serde_json::json!({
                "items": cart.items.len(),
                "subtotal": cart.subtotal(),
                "coupon_code": coupon_code,
                "variant": assignment.as_ref().map(|a| a.variant),
            }))
            .at(self.clock.now());
        self.recorder.record_best_effort(started).await;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let order = match self
            .place_order(&mut tx, &cart, &customer, coupon_code.as_deref(), now)
            .await
        {
            Ok(order) => order,
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                return Err(err);
            }
        };
        tx.commit().await?;

        self.after_commit(&cart, &order, assignment.as_ref()).await;

        Ok(CheckoutReceipt {
            order_id: order.id,
            order_number: order.order_number,
            subtotal: order.subtotal,
            discount: order.discount,
            total_amount: order.total_amount,
            coupon_code: order.coupon_code,
            variant: assignment.map(|a| a.variant),
        })
    }

    /// The atomic part of a checkout. Any error leaves `tx` to be rolled back.
    async fn place_order(
        &self,
        tx: &mut S::Tx,
        cart: &Cart,
        customer: &CustomerInfo,
        coupon_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let validated = match coupon_code {
            Some(code) => Some(
                self.validator
                    .validate(tx, code, cart.subtotal(), customer.user_id.as_ref())
                    .await?,
            ),
            None => None,
        };

        self.ledger.reserve_lines(tx, &cart.items).await?;

        let order_number = self.order_numbers.generate(tx, now.date_naive()).await?;
        let order = Order::place(
            order_number,
            customer.clone(),
            &cart.items,
            validated.as_ref().map(|v| v.discount).unwrap_or_default(),
            validated.as_ref().map(|v| v.coupon.code.clone()),
            now,
        );

        tx.insert_order(&order).await.map_err(|err| match err {
            StoreError::OrderNumberConflict(number) => {
                tracing::warn!(order_number = %number, "order number taken at insert");
                CheckoutError::OrderNumberExhausted {
                    attempts: self.order_numbers.max_attempts(),
                }
            }
            other => other.into(),
        })?;

        if let Some(validated) = &validated {
            let usage = CouponUsage::new(
                validated.coupon.id,
                order.id,
                customer.user_id.clone(),
                order.discount,
                now,
            );
            tx.insert_coupon_usage(&usage).await?;
        }
        Ok(order)
    }

    async fn after_commit(&self, cart: &Cart, order: &Order, assignment: Option<&Assignment>) {
        let token = &cart.token;
        let now = self.clock.now();

        if cart.applied_coupon.is_some()
            && let Err(err) = self.store.set_applied_coupon(token, None).await
        {
            tracing::warn!(error = %err, "failed to clear applied coupon");
        }

        match self.store.mark_cart_recovered(token, now).await {
            Ok(true) => tracing::info!(cart = %token, "abandoned cart recovered"),
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "failed to mark cart recovered"),
        }

        let completed = EventRecord::new(
            actions::CHECKOUT_COMPLETED,
            entities::ORDER,
            order.id.to_string(),
        )
        .actor(token.as_str())
        .payload(serde_json::json!({
            "order_number": order.order_number,
            "subtotal": order.subtotal,
            "discount": order.discount,
            "total_amount": order.total_amount,
            "coupon_code": order.coupon_code,
        }))
        .at(now);
        self.recorder.record_best_effort(completed).await;

        if let Some(assignment) = assignment {
            let used_variant_coupon = assignment.coupon_code.is_some()
                && assignment.coupon_code == order.coupon_code;
            let event = EventRecord::new(
                actions::EXPERIMENT_CHECKOUT,
                entities::EXPERIMENT,
                assignment.experiment_key.as_str(),
            )
            .actor(token.as_str())
            .payload(serde_json::json!({
                "variant": assignment.variant,
                "order_id": order.id,
                "coupon_code": order.coupon_code,
                "used_variant_coupon": used_variant_coupon,
            }))
            .at(now);
            self.recorder.record_best_effort(event).await;
        }
    }

    /// Validates a code against the cart's current subtotal and stores it as
    /// the cart's applied coupon. Nothing is redeemed.
    ///
    /// A rejected code clears any previously applied coupon.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        token: &CartToken,
        code: &str,
        user: Option<&UserId>,
    ) -> Result<AppliedCoupon, CheckoutError> {
        let code = normalize_code(code);
        let subtotal = self
            .store
            .get_cart(token)
            .await?
            .map(|c| c.subtotal())
            .unwrap_or_default();

        let mut tx = self.store.begin().await?;
        let result = if code.is_empty() {
            Err(CouponCheckError::Rejected(CouponRejection::NotFound))
        } else {
            self.validator.validate(&mut tx, &code, subtotal, user).await
        };
        if let Err(err) = tx.rollback().await {
            tracing::warn!(error = %err, "rollback failed");
        }

        let validated = match result {
            Ok(validated) => validated,
            Err(CouponCheckError::Rejected(reason)) => {
                if let Err(err) = self.store.set_applied_coupon(token, None).await {
                    tracing::warn!(error = %err, "failed to clear applied coupon");
                }
                let event =
                    EventRecord::new(actions::COUPON_APPLY_REJECTED, entities::CART, token.as_str())
                        .actor(token.as_str())
                        .payload(serde_json::json!({
                            "code": code,
                            "reason": reason.code(),
                        }))
                        .at(self.clock.now());
                self.recorder.record_best_effort(event).await;
                return Err(CheckoutError::Coupon(reason));
            }
            Err(CouponCheckError::Store(err)) => return Err(err.into()),
        };

        self.store.set_applied_coupon(token, Some(&code)).await?;

        let variant = self
            .resolve_assignment(token)
            .await
            .filter(|a| a.coupon_code.as_deref() == Some(code.as_str()))
            .map(|a| a.variant);
        let event = match variant {
            Some(_) => EventRecord::new(
                actions::COUPON_APPLY,
                entities::EXPERIMENT,
                self.settings.experiment_key.as_str(),
            ),
            None => EventRecord::new(actions::COUPON_APPLY, entities::CART, token.as_str()),
        }
        .actor(token.as_str())
        .payload(serde_json::json!({
            "code": code,
            "variant": variant,
            "discount": validated.discount,
        }))
        .at(self.clock.now());
        self.recorder.record_best_effort(event).await;

        Ok(AppliedCoupon {
            code,
            subtotal,
            discount: validated.discount,
            variant,
        })
    }

    /// Removes the cart's applied coupon.
    pub async fn clear_coupon(&self, token: &CartToken) -> Result<(), CheckoutError> {
        self.store.set_applied_coupon(token, None).await?;
        Ok(())
    }

    fn ensure_payment_configured(&self) -> Result<(), CheckoutError> {
        match &self.settings.payment {
            PaymentMode::Offline => Ok(()),
            PaymentMode::Gateway { url: Some(url) } if !url.trim().is_empty() => Ok(()),
            PaymentMode::Gateway { .. } => Err(CheckoutError::PaymentNotConfigured),
        }
    }

    /// The session's variant, if any. Lookup failures only cost attribution.
    async fn resolve_assignment(&self, token: &CartToken) -> Option<Assignment> {
        match self
            .experiments
            .assign_variant(&self.settings.experiment_key, token.as_str())
            .await
        {
            Ok(assignment) => assignment,
            Err(ExperimentError::NotFound(_)) => None,
            Err(err) => {
                tracing::warn!(error = %err, "experiment assignment unavailable");
                None
            }
        }
    }
}
