//! Operator endpoints for experiment definitions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use checkout::ExperimentReport;
use domain::{Experiment, ExperimentPatch, ExperimentStats, Variant, WindowDays};
use event_log::EventRecorder;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

/// Header naming the operator, recorded as the actor of audit events.
pub const OPERATOR_HEADER: &str = "x-operator";

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    ActivateWinner,
}

#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub action: AdminAction,
    #[serde(default)]
    pub days: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionResponse {
    pub winner: Variant,
    pub experiment: Experiment,
    pub stats: ExperimentStats,
}

fn window(days: Option<i64>) -> WindowDays {
    days.map(WindowDays::clamped).unwrap_or_default()
}

fn operator(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(OPERATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// GET /admin/experiments/{key}?days=N
#[tracing::instrument(skip(state))]
pub async fn get<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(key): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ExperimentReport>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let report = state
        .checkout
        .experiments()
        .compute_stats(&key, window(query.days))
        .await?;
    Ok(Json(report))
}

/// PATCH /admin/experiments/{key}
#[tracing::instrument(skip(state, headers, patch))]
pub async fn update<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<ExperimentPatch>,
) -> Result<Json<Experiment>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    let experiment = state
        .checkout
        .experiments()
        .update_definition(&key, &patch, operator(&headers))
        .await?;
    metrics::counter!("admin_actions_total", "action" => "update").increment(1);
    Ok(Json(experiment))
}

/// POST /admin/experiments/{key}
#[tracing::instrument(skip(state, headers, req))]
pub async fn act<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AdminActionRequest>,
) -> Result<Json<PromotionResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    R: EventRecorder + Clone + 'static,
{
    match req.action {
        AdminAction::ActivateWinner => {
            let report = state
                .checkout
                .experiments()
                .promote_winner(&key, window(req.days), operator(&headers))
                .await?;
            let winner = report.stats.suggested_winner.ok_or_else(|| {
                ApiError::Internal("Promotion finished without a winner".to_string())
            })?;
            metrics::counter!("admin_actions_total", "action" => "activate_winner").increment(1);

            Ok(Json(PromotionResponse {
                winner,
                experiment: report.experiment,
                stats: report.stats,
            }))
        }
    }
}
