//! HTTP API server for the checkout and promotion core.
//!
//! Provides REST endpoints for carts, coupons, checkout, orders and the
//! experiment admin, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use checkout::{CheckoutSettings, SystemClock};
use event_log::{EventRecorder, InMemoryEventRecorder};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CommerceStore, InMemoryCommerceStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, R>(state: Arc<AppState<S, R>>, metrics_handle: PrometheusHandle) -> Router
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/carts/{token}", get(routes::carts::get::<S, R>))
        .route("/carts/{token}/items", post(routes::carts::add_item::<S, R>))
        .route(
            "/carts/{token}/items/{product_id}",
            patch(routes::carts::set_quantity::<S, R>)
                .delete(routes::carts::remove_item::<S, R>),
        )
        .route(
            "/carts/{token}/coupon",
            post(routes::carts::apply_coupon::<S, R>)
                .delete(routes::carts::clear_coupon::<S, R>),
        )
        .route(
            "/carts/{token}/abandoned",
            post(routes::carts::track_abandoned::<S, R>),
        )
        .route("/checkout", post(routes::checkout::submit::<S, R>))
        .route("/orders/{id}", get(routes::orders::get::<S, R>))
        .route(
            "/orders/{id}/payment",
            post(routes::orders::update_payment::<S, R>),
        )
        .route(
            "/experiments/{key}/assignments",
            post(routes::experiments::assign::<S, R>),
        )
        .route(
            "/admin/experiments/{key}",
            get(routes::admin::get::<S, R>)
                .patch(routes::admin::update::<S, R>)
                .post(routes::admin::act::<S, R>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over any store and recorder.
pub fn create_state<S, R>(store: S, recorder: R, settings: CheckoutSettings) -> Arc<AppState<S, R>>
where
    S: CommerceStore + Clone,
    R: EventRecorder + Clone,
{
    Arc::new(AppState::new(
        store,
        recorder,
        Arc::new(SystemClock),
        settings,
    ))
}

/// Creates the default application state backed by in-memory storage.
pub fn create_default_state(
    settings: CheckoutSettings,
) -> Arc<AppState<InMemoryCommerceStore, InMemoryEventRecorder>> {
    create_state(
        InMemoryCommerceStore::new(),
        InMemoryEventRecorder::new(),
        settings,
    )
}
