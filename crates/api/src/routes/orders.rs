//! Order read and payment status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::{Order, PaymentStatus};
use event_log::EventRecorder;
use serde::Deserialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PaymentUpdateRequest {
    pub status: PaymentStatus,
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    uuid::Uuid::parse_str(id)
        .map(OrderId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let order = state.orders.get(parse_order_id(&id)?).await?;
    Ok(Json(order))
}

/// POST /orders/{id}/payment, used by the payment collaborator.
#[tracing::instrument(skip(state, req))]
pub async fn update_payment<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentUpdateRequest>,
) -> Result<Json<Order>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let order = state
        .orders
        .update_payment_status(parse_order_id(&id)?, req.status)
        .await?;
    Ok(Json(order))
}
