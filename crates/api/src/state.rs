//! Shared application state.

use std::sync::Arc;

use checkout::{CartService, CheckoutOrchestrator, CheckoutSettings, Clock, OrderService};
use event_log::EventRecorder;
use store::CommerceStore;

/// Services shared by all handlers.
pub struct AppState<S, R> {
    pub checkout: CheckoutOrchestrator<S, R>,
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub store: S,
    pub recorder: R,
}

impl<S, R> AppState<S, R>
where
    S: CommerceStore + Clone,
    R: EventRecorder + Clone,
{
    pub fn new(store: S, recorder: R, clock: Arc<dyn Clock>, settings: CheckoutSettings) -> Self {
        Self {
            checkout: CheckoutOrchestrator::new(
                store.clone(),
                recorder.clone(),
                clock.clone(),
                settings,
            ),
            carts: CartService::new(store.clone(), clock),
            orders: OrderService::new(store.clone()),
            store,
            recorder,
        }
    }

    /// Key of the experiment consulted by checkout and coupon apply.
    pub fn experiment_key(&self) -> &str {
        &self.checkout.settings().experiment_key
    }
}
