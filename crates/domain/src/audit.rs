//! Action and entity names written to the event log.
//!
//! The statistics step reads impressions and applies back by these names, so
//! writers and readers must share them.

pub mod actions {
    pub const EXPERIMENT_IMPRESSION: &str = "experiment_impression";
    pub const COUPON_APPLY: &str = "coupon_apply";
    pub const COUPON_APPLY_REJECTED: &str = "coupon_apply_rejected";
    pub const CHECKOUT_STARTED: &str = "checkout_started";
    pub const CHECKOUT_COMPLETED: &str = "checkout_completed";
    pub const CHECKOUT_FAILED: &str = "checkout_failed";
    pub const EXPERIMENT_CHECKOUT: &str = "experiment_checkout";
    pub const EXPERIMENT_UPDATED: &str = "experiment_updated";
    pub const EXPERIMENT_WINNER_PROMOTED: &str = "experiment_winner_promoted";
}

pub mod entities {
    pub const EXPERIMENT: &str = "experiment";
    pub const CART: &str = "cart";
    pub const ORDER: &str = "order";
}
