//! Cart item and coupon endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::AppliedCoupon;
use common::{CartToken, Money, ProductId, UserId};
use domain::{Cart, CartItem};
use event_log::EventRecorder;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub token: CartToken,
    pub items: Vec<CartItem>,
    pub subtotal: Money,
    pub applied_coupon: Option<String>,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            subtotal: cart.subtotal(),
            token: cart.token,
            items: cart.items,
            applied_coupon: cart.applied_coupon,
        }
    }
}

// -- Handlers --

/// GET /carts/{token}
#[tracing::instrument(skip(state))]
pub async fn get<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(token): Path<String>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let cart = state.carts.get(&CartToken::new(token)).await?;
    Ok(Json(cart.into()))
}

/// POST /carts/{token}/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(token): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let cart = state
        .carts
        .add_item(
            &CartToken::new(token),
            &ProductId::new(req.product_id),
            req.quantity,
        )
        .await?;
    Ok(Json(cart.into()))
}

/// PATCH /carts/{token}/items/{product_id}; a quantity of 0 removes the line.
#[tracing::instrument(skip(state, req))]
pub async fn set_quantity<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path((token, product_id)): Path<(String, String)>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let cart = state
        .carts
        .set_quantity(
            &CartToken::new(token),
            &ProductId::new(product_id),
            req.quantity,
        )
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /carts/{token}/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path((token, product_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let cart = state
        .carts
        .remove_item(&CartToken::new(token), &ProductId::new(product_id))
        .await?;
    Ok(Json(cart.into()))
}

/// POST /carts/{token}/coupon
#[tracing::instrument(skip(state, req))]
pub async fn apply_coupon<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(token): Path<String>,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<AppliedCoupon>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let user = req.user_id.map(UserId::new);
    let applied = state
        .checkout
        .apply_coupon(&CartToken::new(token), &req.code, user.as_ref())
        .await?;
    Ok(Json(applied))
}

/// DELETE /carts/{token}/coupon
#[tracing::instrument(skip(state))]
pub async fn clear_coupon<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    state.checkout.clear_coupon(&CartToken::new(token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /carts/{token}/abandoned starts abandoned-cart tracking.
#[tracing::instrument(skip(state))]
pub async fn track_abandoned<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    state.carts.track_abandoned(&CartToken::new(token)).await?;
    Ok(StatusCode::ACCEPTED)
}
