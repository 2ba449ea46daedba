//! Per-variant outcome statistics and winner selection.

use std::cmp::Ordering;

use common::Money;
use serde::{Deserialize, Serialize};

use super::Variant;

/// Statistics window in days, clamped to `7..=180`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowDays(u32);

impl WindowDays {
    pub const MIN: u32 = 7;
    pub const MAX: u32 = 180;
    pub const DEFAULT: u32 = 30;

    /// Out-of-range values are clamped, not rejected.
    pub fn clamped(days: i64) -> Self {
        Self(days.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u32)
    }

    pub fn days(&self) -> u32 {
        self.0
    }
}

impl Default for WindowDays {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// `round(numerator / denominator * 100)`, half-up; 0 when the denominator
/// is 0.
pub fn rounded_rate(numerator: u64, denominator: u64) -> u32 {
    if denominator == 0 {
        return 0;
    }
    ((numerator * 100 + denominator / 2) / denominator) as u32
}

/// Raw counts gathered for one variant from the three independent sources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariantOutcomes {
    pub impressions: u64,
    pub applies: u64,
    pub paid_orders: u64,
    pub discount_total: Money,
    pub gross_revenue: Money,
}

/// Derived statistics for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantStats {
    pub variant: Variant,
    pub coupon_code: Option<String>,
    pub impressions: u64,
    pub applies: u64,
    pub paid_orders: u64,
    pub apply_rate: u32,
    pub purchase_rate: u32,
    pub discount_total: Money,
    pub gross_revenue: Money,
    pub net_revenue: Money,
}

impl VariantStats {
    pub fn from_outcomes(
        variant: Variant,
        coupon_code: Option<String>,
        outcomes: &VariantOutcomes,
    ) -> Self {
        Self {
            variant,
            coupon_code,
            impressions: outcomes.impressions,
            applies: outcomes.applies,
            paid_orders: outcomes.paid_orders,
            apply_rate: rounded_rate(outcomes.applies, outcomes.impressions),
            purchase_rate: rounded_rate(outcomes.paid_orders, outcomes.applies),
            discount_total: outcomes.discount_total,
            gross_revenue: outcomes.gross_revenue,
            net_revenue: outcomes.gross_revenue - outcomes.discount_total,
        }
    }

    /// Compares on net revenue, then paid orders, then apply rate.
    fn rank(&self, other: &Self) -> Ordering {
        self.net_revenue
            .cmp(&other.net_revenue)
            .then(self.paid_orders.cmp(&other.paid_orders))
            .then(self.apply_rate.cmp(&other.apply_rate))
    }
}

/// Statistics for both variants plus the suggested winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentStats {
    pub window_days: WindowDays,
    pub per_variant: Vec<VariantStats>,
    pub suggested_winner: Option<Variant>,
}

impl ExperimentStats {
    /// Builds stats for A and B; a full tie leaves no winner.
    pub fn new(window_days: WindowDays, a: VariantStats, b: VariantStats) -> Self {
        let suggested_winner = match a.rank(&b) {
            Ordering::Greater => Some(a.variant),
            Ordering::Less => Some(b.variant),
            Ordering::Equal => None,
        };
        Self {
            window_days,
            per_variant: vec![a, b],
            suggested_winner,
        }
    }

    pub fn variant(&self, variant: Variant) -> Option<&VariantStats> {
        self.per_variant.iter().find(|s| s.variant == variant)
    }
}
