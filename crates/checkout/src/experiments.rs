//! Experiment allocation, statistics and operator actions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domain::audit::{actions, entities};
use domain::{
    Experiment, ExperimentPatch, ExperimentStats, Variant, VariantOutcomes, VariantStats,
    WindowDays,
};
use event_log::{EventQuery, EventRecord, EventRecorder, EventRecorderExt};
use serde::Serialize;
use store::{CommerceStore, CouponOutcomes, StoreTransaction};

use crate::clock::Clock;
use crate::error::ExperimentError;

/// A session's variant under the current experiment definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub experiment_key: String,
    pub variant: Variant,
    pub coupon_code: Option<String>,
    pub version: i64,
}

/// Definition plus computed statistics, as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentReport {
    pub experiment: Experiment,
    pub stats: ExperimentStats,
}

/// Assigns sessions to variants and evaluates outcomes.
///
/// Definitions are read from the store on every call; nothing is cached.
pub struct ExperimentAllocator<S, R> {
    store: S,
    recorder: R,
    clock: Arc<dyn Clock>,
}

impl<S, R> ExperimentAllocator<S, R>
where
    S: CommerceStore,
    R: EventRecorder,
{
    pub fn new(store: S, recorder: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            recorder,
            clock,
        }
    }

    pub async fn definition(&self, key: &str) -> Result<Experiment, ExperimentError> {
        self.store
            .get_experiment(key)
            .await?
            .ok_or_else(|| ExperimentError::NotFound(key.to_string()))
    }

    /// Creates a disabled definition if none exists yet.
    pub async fn ensure_definition(
        &self,
        key: &str,
        name: &str,
    ) -> Result<Experiment, ExperimentError> {
        if let Some(existing) = self.store.get_experiment(key).await? {
            return Ok(existing);
        }
        let mut experiment = Experiment::new(key, name);
        experiment.updated_at = self.clock.now();
        self.store.save_experiment(&experiment).await?;
        tracing::info!(experiment = key, "experiment definition created");
        Ok(experiment)
    }

    /// Deterministic variant for a session, or `None` when the experiment is
    /// disabled or the session is outside the traffic gate.
    #[tracing::instrument(skip(self))]
    pub async fn assign_variant(
        &self,
        key: &str,
        session_token: &str,
    ) -> Result<Option<Assignment>, ExperimentError> {
        let experiment = self.definition(key).await?;
        let Some(variant) = experiment.assign(session_token) else {
            return Ok(None);
        };

        metrics::counter!("experiment_assignments_total", "variant" => variant.as_str())
            .increment(1);
        Ok(Some(Assignment {
            experiment_key: experiment.key.clone(),
            variant,
            coupon_code: experiment.coupon_code(variant).map(str::to_string),
            version: experiment.version,
        }))
    }

    /// Assigns a variant for display and records an impression for it.
    pub async fn present_variant(
        &self,
        key: &str,
        session_token: &str,
    ) -> Result<Option<Assignment>, ExperimentError> {
        let assignment = self.assign_variant(key, session_token).await?;
        if let Some(a) = &assignment {
            let event = EventRecord::new(actions::EXPERIMENT_IMPRESSION, entities::EXPERIMENT, key)
                .actor(session_token)
                .payload(serde_json::json!({
                    "variant": a.variant,
                    "coupon_code": a.coupon_code,
                    "version": a.version,
                }))
                .at(self.clock.now());
            self.recorder.record_best_effort(event).await;
        }
        Ok(assignment)
    }

    /// Aggregates impressions, applies and paid outcomes per variant over
    /// the last `window` days and suggests a winner.
    #[tracing::instrument(skip(self))]
    pub async fn compute_stats(
        &self,
        key: &str,
        window: WindowDays,
    ) -> Result<ExperimentReport, ExperimentError> {
        let experiment = self.definition(key).await?;
        let since = self.clock.now() - Duration::days(i64::from(window.days()));

        let events = self
            .recorder
            .query(
                EventQuery::for_entity(entities::EXPERIMENT, key)
                    .actions(vec![
                        actions::EXPERIMENT_IMPRESSION.to_string(),
                        actions::COUPON_APPLY.to_string(),
                    ])
                    .from_timestamp(since),
            )
            .await?;
        let impressions = distinct_per_variant(&events, actions::EXPERIMENT_IMPRESSION);
        let applies = distinct_per_variant(&events, actions::COUPON_APPLY);

        let a = self
            .variant_stats(&experiment, Variant::A, &impressions, &applies, since)
            .await?;
        let b = self
            .variant_stats(&experiment, Variant::B, &impressions, &applies, since)
            .await?;
        let stats = ExperimentStats::new(window, a, b);
        Ok(ExperimentReport { experiment, stats })
    }

    async fn variant_stats(
        &self,
        experiment: &Experiment,
        variant: Variant,
        impressions: &HashMap<Variant, u64>,
        applies: &HashMap<Variant, u64>,
        since: DateTime<Utc>,
    ) -> Result<VariantStats, ExperimentError> {
        let code = experiment.coupon_code(variant);
        let paid = match code {
            Some(code) => self.store.paid_coupon_outcomes(code, since).await?,
            None => CouponOutcomes::default(),
        };
        let outcomes = VariantOutcomes {
            impressions: impressions.get(&variant).copied().unwrap_or(0),
            applies: applies.get(&variant).copied().unwrap_or(0),
            paid_orders: paid.paid_orders,
            discount_total: paid.discount_total,
            gross_revenue: paid.gross_revenue,
        };
        Ok(VariantStats::from_outcomes(
            variant,
            code.map(str::to_string),
            &outcomes,
        ))
    }

    /// Forces the suggested winner, activates its coupon and deactivates the
    /// loser's, all in one transaction.
    ///
    /// A tie fails with [`ExperimentError::NoWinner`] before anything is
    /// written. Checkouts that already validated the losing coupon are not
    /// affected; only later validations see it inactive.
    #[tracing::instrument(skip(self))]
    pub async fn promote_winner(
        &self,
        key: &str,
        window: WindowDays,
        operator: Option<&str>,
    ) -> Result<ExperimentReport, ExperimentError> {
        let report = self.compute_stats(key, window).await?;
        self.promote_report(report, window, operator).await
    }

    /// Promotes the winner of an already computed report.
    ///
    /// Fails with [`ExperimentError::VersionMismatch`] and writes nothing if
    /// the definition changed since the report was computed.
    pub async fn promote_report(
        &self,
        report: ExperimentReport,
        window: WindowDays,
        operator: Option<&str>,
    ) -> Result<ExperimentReport, ExperimentError> {
        let key = report.experiment.key.as_str();
        let Some(winner) = report.stats.suggested_winner else {
            tracing::info!(experiment = key, "no winner to promote");
            return Err(ExperimentError::NoWinner {
                key: key.to_string(),
            });
        };

        let mut tx = self.store.begin().await?;
        let current = tx
            .get_experiment_for_update(key)
            .await?
            .ok_or_else(|| ExperimentError::NotFound(key.to_string()))?;

        if current.version != report.experiment.version {
            tx.rollback().await?;
            tracing::warn!(
                experiment = key,
                expected = report.experiment.version,
                found = current.version,
                "experiment changed during promotion"
            );
            return Err(ExperimentError::VersionMismatch {
                key: key.to_string(),
                expected: report.experiment.version,
                found: current.version,
            });
        }

        let mut promoted = current.clone();
        promoted.force_variant = Some(winner);
        promoted.version = current.version + 1;
        promoted.updated_at = self.clock.now();
        tx.save_experiment(&promoted).await?;

        let winning_code = promoted.coupon_code(winner);
        if let Some(code) = winning_code {
            tx.set_coupon_active(code, true).await?;
        }
        if let Some(code) = promoted.coupon_code(winner.other())
            && Some(code) != winning_code
        {
            tx.set_coupon_active(code, false).await?;
        }
        tx.commit().await?;

        metrics::counter!("experiment_promotions_total").increment(1);
        tracing::info!(experiment = key, %winner, version = promoted.version, "winner promoted");

        let mut event =
            EventRecord::new(actions::EXPERIMENT_WINNER_PROMOTED, entities::EXPERIMENT, key)
                .payload(serde_json::json!({
                    "winner": winner,
                    "window_days": window.days(),
                    "before": current,
                    "after": promoted,
                }))
                .at(self.clock.now());
        if let Some(operator) = operator {
            event = event.actor(operator);
        }
        self.recorder.record_best_effort(event).await;

        Ok(ExperimentReport {
            experiment: promoted,
            stats: report.stats,
        })
    }

    /// Applies a partial update and bumps the definition version.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_definition(
        &self,
        key: &str,
        patch: &ExperimentPatch,
        operator: Option<&str>,
    ) -> Result<Experiment, ExperimentError> {
        let mut tx = self.store.begin().await?;
        let current = tx
            .get_experiment_for_update(key)
            .await?
            .ok_or_else(|| ExperimentError::NotFound(key.to_string()))?;
        let updated = patch.apply(&current, self.clock.now());
        tx.save_experiment(&updated).await?;
        tx.commit().await?;

        tracing::info!(experiment = key, version = updated.version, "experiment updated");

        let mut event = EventRecord::new(actions::EXPERIMENT_UPDATED, entities::EXPERIMENT, key)
            .payload(serde_json::json!({
                "before": current,
                "after": updated,
            }))
            .at(self.clock.now());
        if let Some(operator) = operator {
            event = event.actor(operator);
        }
        self.recorder.record_best_effort(event).await;

        Ok(updated)
    }
}

/// Counts distinct actors per variant for one action.
///
/// Duplicate events from the same session count once; events without an
/// actor count once per event id. Order does not matter.
fn distinct_per_variant(events: &[EventRecord], action: &str) -> HashMap<Variant, u64> {
    let mut seen: HashMap<Variant, HashSet<String>> = HashMap::new();
    for event in events.iter().filter(|e| e.action == action) {
        let Some(variant) = event
            .payload_str("variant")
            .and_then(|v| v.parse::<Variant>().ok())
        else {
            continue;
        };
        let identity = event
            .actor
            .clone()
            .unwrap_or_else(|| event.event_id.to_string());
        seen.entry(variant).or_default().insert(identity);
    }
    seen.into_iter()
        .map(|(variant, actors)| (variant, actors.len() as u64))
        .collect()
}
