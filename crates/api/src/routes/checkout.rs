//! Checkout submission endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutReceipt, CheckoutRequest};
use event_log::EventRecorder;
use serde::Serialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CheckoutResponse {
    #[serde(flatten)]
    pub receipt: CheckoutReceipt,
    /// Order detail view the storefront should navigate to.
    pub redirect: String,
}

/// POST /checkout
///
/// Success answers `201` with a `Location` pointing at the new order. Failures
/// carry one of the checkout statuses in the body.
#[tracing::instrument(skip(state, req))]
pub async fn submit<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Response, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let receipt = state.checkout.checkout(req).await?;
    let redirect = format!("/orders/{}", receipt.order_id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, redirect.clone())],
        Json(CheckoutResponse { receipt, redirect }),
    )
        .into_response())
}
