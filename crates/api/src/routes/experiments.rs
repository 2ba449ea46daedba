//! Storefront-facing experiment assignment.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::Variant;
use event_log::EventRecorder;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AssignmentRequest {
    pub session_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    pub experiment_key: String,
    pub assigned: bool,
    pub variant: Option<Variant>,
    pub coupon_code: Option<String>,
    pub version: Option<i64>,
}

/// POST /experiments/{key}/assignments
///
/// Sessions outside the experiment get `assigned: false`. An assignment also
/// records an impression.
#[tracing::instrument(skip(state, req))]
pub async fn assign<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(key): Path<String>,
    Json(req): Json<AssignmentRequest>,
) -> Result<Json<AssignmentResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    if req.session_token.trim().is_empty() {
        return Err(ApiError::BadRequest("session_token is required".to_string()));
    }

    let assignment = state
        .checkout
        .experiments()
        .present_variant(&key, &req.session_token)
        .await?;

    Ok(Json(match assignment {
        Some(a) => AssignmentResponse {
            experiment_key: a.experiment_key,
            assigned: true,
            variant: Some(a.variant),
            coupon_code: a.coupon_code,
            version: Some(a.version),
        },
        None => AssignmentResponse {
            experiment_key: key,
            assigned: false,
            variant: None,
            coupon_code: None,
            version: None,
        },
    }))
}
