//! Integration tests for checkout, coupons and experiments over the
//! in-memory store.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use checkout::{
    CartService, CheckoutError, CheckoutOrchestrator, CheckoutRequest, CheckoutSettings,
    CheckoutStatus, ExperimentError, FixedClock, OrderService, PaymentMode,
};
use common::{CartToken, Money, ProductId, UserId};
use domain::audit::{actions, entities};
use domain::{
    Address, Coupon, CouponRejection, CustomerInfo, Experiment, ExperimentPatch, Order, OrderNumber,
    PaymentStatus, Product, Variant, WindowDays,
};
use event_log::InMemoryEventRecorder;
use store::{CommerceStore, InMemoryCommerceStore, StoreTransaction};

const EXPERIMENT: &str = "checkout_promo";

type TestOrchestrator = CheckoutOrchestrator<InMemoryCommerceStore, InMemoryEventRecorder>;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
}

fn customer() -> CustomerInfo {
    CustomerInfo {
        user_id: None,
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: "+44 20 7946 0000".to_string(),
        address: Address {
            line1: "12 Analytical Row".to_string(),
            line2: None,
            city: "London".to_string(),
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
        },
    }
}

struct TestHarness {
    store: InMemoryCommerceStore,
    recorder: InMemoryEventRecorder,
    orchestrator: Arc<TestOrchestrator>,
    carts: CartService<InMemoryCommerceStore>,
    orders: OrderService<InMemoryCommerceStore>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_settings(CheckoutSettings::default())
    }

    fn with_settings(settings: CheckoutSettings) -> Self {
        let store = InMemoryCommerceStore::new();
        let recorder = InMemoryEventRecorder::new();
        let clock = Arc::new(FixedClock(now()));
        let orchestrator = CheckoutOrchestrator::new(
            store.clone(),
            recorder.clone(),
            clock.clone(),
            settings,
        );

        Self {
            carts: CartService::new(store.clone(), clock),
            orders: OrderService::new(store.clone()),
            orchestrator: Arc::new(orchestrator),
            store,
            recorder,
        }
    }

    async fn product(&self, product: Product) -> ProductId {
        let id = product.id.clone();
        self.store.upsert_product(&product).await.unwrap();
        id
    }

    async fn coupon(&self, coupon: Coupon) {
        self.store.insert_coupon(&coupon).await.unwrap();
    }

    async fn cart(&self, token: &str, lines: &[(&ProductId, u32)]) -> CartToken {
        let token = CartToken::new(token);
        for (product_id, quantity) in lines {
            self.carts
                .add_item(&token, product_id, *quantity)
                .await
                .unwrap();
        }
        token
    }

    fn request(token: &CartToken, coupon: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            cart_token: token.clone(),
            customer: customer(),
            coupon_code: coupon.map(str::to_string),
        }
    }

    async fn stock(&self, id: &ProductId) -> u32 {
        self.store
            .get_product(id)
            .await
            .unwrap()
            .unwrap()
            .available_quantity
    }

    async fn enable_experiment(&self, code_a: &str, code_b: &str) -> Experiment {
        let mut experiment = Experiment::new(EXPERIMENT, "Checkout promo");
        experiment.enabled = true;
        experiment.coupon_code_a = Some(code_a.to_string());
        experiment.coupon_code_b = Some(code_b.to_string());
        experiment.updated_at = now();
        self.store.save_experiment(&experiment).await.unwrap();
        experiment
    }
}

fn token_for(experiment: &Experiment, variant: Variant) -> String {
    (0..10_000)
        .map(|i| format!("session-{i}"))
        .find(|t| experiment.assign(t) == Some(variant))
        .unwrap()
}

#[tokio::test]
async fn test_checkout_places_pending_order() {
    let h = TestHarness::new();
    let lamp = h
        .product(Product::limited("SKU-LAMP", "Lamp", Money::from_cents(4000), 3))
        .await;
    let token = h.cart("cart-1", &[(&lamp, 2)]).await;

    let receipt = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap();

    assert_eq!(receipt.order_number.as_str(), "ORD-20261017-000001");
    assert_eq!(receipt.subtotal.cents(), 8000);
    assert_eq!(receipt.total_amount.cents(), 8000);
    assert_eq!(receipt.variant, None);
    assert_eq!(h.stock(&lamp).await, 1);

    let order = h.orders.get(receipt.order_id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.lines.len(), 1);

    let completed = h
        .recorder
        .events_with_action(actions::CHECKOUT_COMPLETED)
        .await;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].entity_type, entities::ORDER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let h = TestHarness::new();
    let stock = 5;
    let widget = h
        .product(Product::limited(
            "SKU-W",
            "Widget",
            Money::from_cents(1000),
            stock,
        ))
        .await;

    let mut tokens = Vec::new();
    for i in 0..=stock {
        tokens.push(h.cart(&format!("cart-{i}"), &[(&widget, 1)]).await);
    }

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .checkout(TestHarness::request(&token, None))
                    .await
            })
        })
        .collect();

    let mut placed = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(err) => {
                assert_eq!(err.status(), CheckoutStatus::Stock);
                out_of_stock += 1;
            }
        }
    }

    assert_eq!(placed, stock);
    assert_eq!(out_of_stock, 1);
    assert_eq!(h.stock(&widget).await, 0);
    assert_eq!(h.store.order_count().await.unwrap(), u64::from(stock));
}

#[tokio::test]
async fn test_failed_line_leaves_nothing_behind() {
    let h = TestHarness::new();
    let first = h
        .product(Product::limited("SKU-1", "Kettle", Money::from_cents(3000), 3))
        .await;
    let second = h
        .product(Product::limited("SKU-2", "Toaster", Money::from_cents(2500), 2))
        .await;
    h.coupon(Coupon::fixed("SAVE5", Money::from_cents(500))).await;
    let token = h.cart("cart-1", &[(&first, 1), (&second, 2)]).await;

    // Someone else takes one toaster after the cart was filled.
    let mut tx = h.store.begin().await.unwrap();
    assert_eq!(tx.decrement_stock(&second, 1).await.unwrap(), 1);
    tx.commit().await.unwrap();

    let err = h
        .orchestrator
        .checkout(TestHarness::request(&token, Some("SAVE5")))
        .await
        .unwrap_err();

    assert_eq!(err.status(), CheckoutStatus::Stock);
    assert!(err.is_recoverable());
    assert_eq!(h.stock(&first).await, 3);
    assert_eq!(h.stock(&second).await, 1);
    assert_eq!(h.store.order_count().await.unwrap(), 0);
    assert!(h.store.coupon_usages().await.is_empty());
    assert_eq!(
        h.recorder
            .events_with_action(actions::CHECKOUT_FAILED)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_percent_coupon_is_capped() {
    let h = TestHarness::new();
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    h.coupon(Coupon::percent("P10", 10).with_max_discount(Money::from_cents(100)))
        .await;
    let token = h.cart("cart-1", &[(&book, 2)]).await;

    let receipt = h
        .orchestrator
        .checkout(TestHarness::request(&token, Some("p10")))
        .await
        .unwrap();

    assert_eq!(receipt.subtotal.cents(), 2000);
    assert_eq!(receipt.discount.cents(), 100);
    assert_eq!(receipt.total_amount.cents(), 1900);
    assert_eq!(receipt.coupon_code.as_deref(), Some("P10"));

    let usages = h.store.coupon_usages().await;
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].order_id, receipt.order_id);
    assert_eq!(usages[0].discount_amount.cents(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_redemption_goes_to_one_checkout() {
    let h = TestHarness::new();
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    h.coupon(Coupon::fixed("LAST", Money::from_cents(200)).with_usage_limit(1))
        .await;
    let a = h.cart("cart-a", &[(&book, 1)]).await;
    let b = h.cart("cart-b", &[(&book, 1)]).await;

    let handles: Vec<_> = [a, b]
        .into_iter()
        .map(|token| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .checkout(TestHarness::request(&token, Some("LAST")))
                    .await
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(CheckoutError::Coupon(CouponRejection::UsageExhausted))
    )));
    assert_eq!(h.store.coupon_usages().await.len(), 1);
    assert_eq!(h.store.order_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_per_user_limit_ignores_guests() {
    let h = TestHarness::new();
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    h.coupon(Coupon::fixed("WELCOME", Money::from_cents(200)).with_per_user_limit(1))
        .await;

    let mut member = TestHarness::request(&h.cart("cart-1", &[(&book, 1)]).await, Some("WELCOME"));
    member.customer.user_id = Some(UserId::new("user-1"));
    h.orchestrator.checkout(member.clone()).await.unwrap();

    member.cart_token = h.cart("cart-2", &[(&book, 1)]).await;
    assert!(matches!(
        h.orchestrator.checkout(member).await,
        Err(CheckoutError::Coupon(CouponRejection::PerUserExhausted))
    ));

    let guest = TestHarness::request(&h.cart("cart-3", &[(&book, 1)]).await, Some("WELCOME"));
    h.orchestrator.checkout(guest).await.unwrap();
}

#[tokio::test]
async fn test_failing_recorder_does_not_undo_order() {
    let h = TestHarness::new();
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    let token = h.cart("cart-1", &[(&book, 1)]).await;
    h.recorder.set_fail_on_record(true);

    let receipt = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap();

    assert!(h.orders.get(receipt.order_id).await.is_ok());
    assert_eq!(h.recorder.event_count().await, 0);
}

#[tokio::test]
async fn test_commit_failure_is_an_error_status() {
    let h = TestHarness::new();
    let lamp = h
        .product(Product::limited("SKU-LAMP", "Lamp", Money::from_cents(4000), 3))
        .await;
    let token = h.cart("cart-1", &[(&lamp, 1)]).await;
    h.store.set_fail_on_commit(true);

    let err = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap_err();

    assert_eq!(err.status(), CheckoutStatus::Error);
    assert!(!err.is_recoverable());
    h.store.set_fail_on_commit(false);
    assert_eq!(h.stock(&lamp).await, 3);
    assert_eq!(h.store.order_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_cart_and_incomplete_customer_are_rejected() {
    let h = TestHarness::new();
    let missing = CartToken::new("nobody");
    assert!(matches!(
        h.orchestrator
            .checkout(TestHarness::request(&missing, None))
            .await,
        Err(CheckoutError::EmptyCart)
    ));

    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    let token = h.cart("cart-1", &[(&book, 1)]).await;
    let mut request = TestHarness::request(&token, None);
    request.customer.address.city = String::new();

    let err = h.orchestrator.checkout(request).await.unwrap_err();
    assert_eq!(err.status(), CheckoutStatus::AddressRequired);
    assert_eq!(h.store.order_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_gateway_without_url_is_unavailable() {
    let h = TestHarness::with_settings(CheckoutSettings {
        payment: PaymentMode::Gateway { url: None },
        ..CheckoutSettings::default()
    });
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    let token = h.cart("cart-1", &[(&book, 1)]).await;

    let err = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap_err();
    assert_eq!(err.status(), CheckoutStatus::PaymentUnavailable);
    assert_eq!(err.status().as_str(), "payment_unavailable");
    assert_eq!(h.store.order_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_order_number_exhaustion_fails_checkout() {
    let h = TestHarness::with_settings(CheckoutSettings {
        order_number_attempts: 2,
        ..CheckoutSettings::default()
    });
    for seq in 1..=2 {
        let order = Order::place(
            OrderNumber::from_string(format!("ORD-20261017-{seq:06}")),
            customer(),
            &[],
            Money::zero(),
            None,
            now(),
        );
        let mut tx = h.store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
    }

    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    let token = h.cart("cart-1", &[(&book, 1)]).await;

    let err = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::OrderNumberExhausted { attempts: 2 }
    ));
    assert_eq!(err.status(), CheckoutStatus::Error);
}

#[tokio::test]
async fn test_apply_and_clear_coupon() {
    let h = TestHarness::new();
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    h.coupon(Coupon::fixed("SAVE5", Money::from_cents(500))).await;
    let token = h.cart("cart-1", &[(&book, 2)]).await;

    let applied = h
        .orchestrator
        .apply_coupon(&token, " save5 ", None)
        .await
        .unwrap();
    assert_eq!(applied.code, "SAVE5");
    assert_eq!(applied.discount.cents(), 500);
    assert_eq!(
        h.carts.get(&token).await.unwrap().applied_coupon.as_deref(),
        Some("SAVE5")
    );

    let events = h.recorder.events_with_action(actions::COUPON_APPLY).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entity_type, entities::CART);

    let rejected = h.orchestrator.apply_coupon(&token, "BOGUS", None).await;
    assert!(matches!(
        rejected,
        Err(CheckoutError::Coupon(CouponRejection::NotFound))
    ));
    assert_eq!(h.carts.get(&token).await.unwrap().applied_coupon, None);
    assert_eq!(
        h.recorder
            .events_with_action(actions::COUPON_APPLY_REJECTED)
            .await
            .len(),
        1
    );

    h.orchestrator.apply_coupon(&token, "SAVE5", None).await.unwrap();
    h.orchestrator.clear_coupon(&token).await.unwrap();
    assert_eq!(h.carts.get(&token).await.unwrap().applied_coupon, None);
}

#[tokio::test]
async fn test_applied_coupon_is_used_and_cleared_by_checkout() {
    let h = TestHarness::new();
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    h.coupon(Coupon::fixed("SAVE5", Money::from_cents(500))).await;
    let token = h.cart("cart-1", &[(&book, 2)]).await;
    h.orchestrator.apply_coupon(&token, "SAVE5", None).await.unwrap();

    let receipt = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap();

    assert_eq!(receipt.discount.cents(), 500);
    assert_eq!(receipt.total_amount.cents(), 1500);
    assert_eq!(h.carts.get(&token).await.unwrap().applied_coupon, None);
}

#[tokio::test]
async fn test_variant_coupon_apply_is_attributed_to_experiment() {
    let h = TestHarness::new();
    h.coupon(Coupon::fixed("PROMO-A", Money::from_cents(300))).await;
    h.coupon(Coupon::percent("PROMO-B", 20)).await;
    let experiment = h.enable_experiment("PROMO-A", "PROMO-B").await;
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;

    let session = token_for(&experiment, Variant::B);
    let token = h.cart(&session, &[(&book, 1)]).await;

    let applied = h
        .orchestrator
        .apply_coupon(&token, "PROMO-B", None)
        .await
        .unwrap();
    assert_eq!(applied.variant, Some(Variant::B));

    let events = h.recorder.events_with_action(actions::COUPON_APPLY).await;
    assert_eq!(events[0].entity_type, entities::EXPERIMENT);
    assert_eq!(events[0].entity_id, EXPERIMENT);
    assert_eq!(events[0].actor.as_deref(), Some(session.as_str()));

    let receipt = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap();
    assert_eq!(receipt.variant, Some(Variant::B));
    assert_eq!(
        h.recorder
            .events_with_action(actions::EXPERIMENT_CHECKOUT)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_assignment_is_deterministic_per_session() {
    let h = TestHarness::new();
    h.enable_experiment("PROMO-A", "PROMO-B").await;
    let allocator = h.orchestrator.experiments();

    for i in 0..50 {
        let token = format!("session-{i}");
        let first = allocator.assign_variant(EXPERIMENT, &token).await.unwrap();
        let second = allocator.assign_variant(EXPERIMENT, &token).await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    assert!(matches!(
        allocator.assign_variant("unknown", "session-1").await,
        Err(ExperimentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_promote_with_tie_changes_nothing() {
    let h = TestHarness::new();
    h.coupon(Coupon::fixed("PROMO-A", Money::from_cents(300))).await;
    h.coupon(Coupon::fixed("PROMO-B", Money::from_cents(300))).await;
    let before = h.enable_experiment("PROMO-A", "PROMO-B").await;

    let result = h
        .orchestrator
        .experiments()
        .promote_winner(EXPERIMENT, WindowDays::default(), Some("ops"))
        .await;
    assert!(matches!(result, Err(ExperimentError::NoWinner { .. })));

    let after = h.store.get_experiment(EXPERIMENT).await.unwrap().unwrap();
    assert_eq!(after, before);
    for code in ["PROMO-A", "PROMO-B"] {
        assert!(h.store.get_coupon(code).await.unwrap().unwrap().is_active);
    }
    assert!(
        h.recorder
            .events_with_action(actions::EXPERIMENT_WINNER_PROMOTED)
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_promote_forces_winner_and_toggles_coupons() {
    let h = TestHarness::new();
    h.coupon(Coupon::fixed("PROMO-A", Money::from_cents(300))).await;
    h.coupon(Coupon::fixed("PROMO-B", Money::from_cents(300))).await;
    let experiment = h.enable_experiment("PROMO-A", "PROMO-B").await;
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(2000)))
        .await;

    let session = token_for(&experiment, Variant::A);
    let token = h.cart(&session, &[(&book, 1)]).await;
    h.orchestrator
        .experiments()
        .present_variant(EXPERIMENT, &session)
        .await
        .unwrap();
    h.orchestrator.apply_coupon(&token, "PROMO-A", None).await.unwrap();
    let receipt = h
        .orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap();
    h.orders
        .update_payment_status(receipt.order_id, PaymentStatus::Paid)
        .await
        .unwrap();

    let report = h
        .orchestrator
        .experiments()
        .promote_winner(EXPERIMENT, WindowDays::default(), Some("ops"))
        .await
        .unwrap();

    assert_eq!(report.stats.suggested_winner, Some(Variant::A));
    let a = report.stats.variant(Variant::A).unwrap();
    assert_eq!(a.impressions, 1);
    assert_eq!(a.applies, 1);
    assert_eq!(a.paid_orders, 1);
    assert_eq!(a.gross_revenue.cents(), 1700);
    assert_eq!(a.net_revenue.cents(), 1400);

    assert_eq!(report.experiment.force_variant, Some(Variant::A));
    assert_eq!(report.experiment.version, experiment.version + 1);
    assert!(h.store.get_coupon("PROMO-A").await.unwrap().unwrap().is_active);
    assert!(!h.store.get_coupon("PROMO-B").await.unwrap().unwrap().is_active);

    // Forced variant now wins for every session.
    let loser = token_for(&experiment, Variant::B);
    let assignment = h
        .orchestrator
        .experiments()
        .assign_variant(EXPERIMENT, &loser)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assignment.variant, Variant::A);

    let promoted = h
        .recorder
        .events_with_action(actions::EXPERIMENT_WINNER_PROMOTED)
        .await;
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].actor.as_deref(), Some("ops"));
}

#[tokio::test]
async fn test_promote_rejects_report_from_older_definition() {
    let h = TestHarness::new();
    h.coupon(Coupon::fixed("PROMO-A", Money::from_cents(300))).await;
    h.coupon(Coupon::fixed("PROMO-B", Money::from_cents(300))).await;
    let experiment = h.enable_experiment("PROMO-A", "PROMO-B").await;
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(2000)))
        .await;

    let session = token_for(&experiment, Variant::A);
    let token = h.cart(&session, &[(&book, 1)]).await;
    let receipt = h
        .orchestrator
        .checkout(TestHarness::request(&token, Some("PROMO-A")))
        .await
        .unwrap();
    h.orders
        .update_payment_status(receipt.order_id, PaymentStatus::Paid)
        .await
        .unwrap();

    let allocator = h.orchestrator.experiments();
    let report = allocator
        .compute_stats(EXPERIMENT, WindowDays::default())
        .await
        .unwrap();
    assert_eq!(report.stats.suggested_winner, Some(Variant::A));

    // The codes are swapped after the operator looked at the report.
    let swapped = allocator
        .update_definition(
            EXPERIMENT,
            &ExperimentPatch {
                coupon_code_a: Some(Some("PROMO-B".to_string())),
                coupon_code_b: Some(Some("PROMO-A".to_string())),
                ..ExperimentPatch::default()
            },
            Some("ops"),
        )
        .await
        .unwrap();

    let result = allocator
        .promote_report(report, WindowDays::default(), Some("ops"))
        .await;
    match result {
        Err(ExperimentError::VersionMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, experiment.version);
            assert_eq!(found, swapped.version);
        }
        other => panic!("expected version mismatch, got {other:?}"),
    }

    let stored = h.store.get_experiment(EXPERIMENT).await.unwrap().unwrap();
    assert_eq!(stored, swapped);
    assert_eq!(stored.force_variant, None);
    for code in ["PROMO-A", "PROMO-B"] {
        assert!(h.store.get_coupon(code).await.unwrap().unwrap().is_active);
    }
}

#[tokio::test]
async fn test_checkout_recovers_abandoned_cart() {
    let h = TestHarness::new();
    let book = h
        .product(Product::unlimited("SKU-B", "Book", Money::from_cents(1000)))
        .await;
    let token = h.cart("cart-1", &[(&book, 1)]).await;
    h.carts.track_abandoned(&token).await.unwrap();
    assert!(
        !h.store
            .abandoned_cart(&token)
            .await
            .unwrap()
            .unwrap()
            .is_recovered()
    );

    h.orchestrator
        .checkout(TestHarness::request(&token, None))
        .await
        .unwrap();

    let abandoned = h.store.abandoned_cart(&token).await.unwrap().unwrap();
    assert_eq!(abandoned.recovered_at, Some(now()));
}
