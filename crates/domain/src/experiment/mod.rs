//! Promotion A/B experiments.

mod allocation;
mod patch;
mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use allocation::bucket;
pub use patch::ExperimentPatch;
pub use stats::{ExperimentStats, VariantOutcomes, VariantStats, WindowDays, rounded_rate};

/// One of the two promotional treatments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::A, Variant::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::A => "A",
            Variant::B => "B",
        }
    }

    pub fn other(&self) -> Variant {
        match self {
            Variant::A => Variant::B,
            Variant::B => Variant::A,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(Variant::A),
            "B" | "b" => Ok(Variant::B),
            other => Err(format!("unknown variant: {other}")),
        }
    }
}

/// A named promotion test.
///
/// Definitions are versioned records read fresh on every request; `version`
/// increases with each change so readers can tell definitions apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub key: String,
    pub name: String,
    pub enabled: bool,
    /// Share of sessions that enter the experiment at all, 0..=100.
    pub traffic_percent: u8,
    /// Share of entered sessions that get variant A, 0..=100.
    pub split_percent_a: u8,
    /// Operator override that bypasses bucketing.
    pub force_variant: Option<Variant>,
    pub coupon_code_a: Option<String>,
    pub coupon_code_b: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// A disabled experiment with full traffic and an even split.
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            enabled: false,
            traffic_percent: 100,
            split_percent_a: 50,
            force_variant: None,
            coupon_code_a: None,
            coupon_code_b: None,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn coupon_code(&self, variant: Variant) -> Option<&str> {
        match variant {
            Variant::A => self.coupon_code_a.as_deref(),
            Variant::B => self.coupon_code_b.as_deref(),
        }
    }

    /// Which variant, if any, uses this (normalized) coupon code.
    pub fn variant_for_coupon(&self, code: &str) -> Option<Variant> {
        Variant::ALL
            .into_iter()
            .find(|v| self.coupon_code(*v) == Some(code))
    }

    /// Deterministically assigns a session to a variant.
    ///
    /// Returns `None` when the experiment is disabled or the session falls
    /// outside the traffic gate. A forced variant wins over bucketing.
    pub fn assign(&self, session_token: &str) -> Option<Variant> {
        if !self.enabled {
            return None;
        }
        if let Some(forced) = self.force_variant {
            return Some(forced);
        }
        if allocation::bucket(allocation::TRAFFIC, &self.key, session_token) >= self.traffic_percent
        {
            return None;
        }
        if allocation::bucket(allocation::SPLIT, &self.key, session_token) < self.split_percent_a {
            Some(Variant::A)
        } else {
            Some(Variant::B)
        }
    }
}
