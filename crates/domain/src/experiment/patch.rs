use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Experiment, Variant};
use crate::coupon::normalize_code;

/// Partial update of an experiment definition.
///
/// Absent fields keep their prior value. For the nullable fields an explicit
/// `null` clears the value, which is why they are `Option<Option<_>>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub traffic: Option<i64>,
    #[serde(default)]
    pub split_a: Option<i64>,
    #[serde(default, deserialize_with = "present")]
    pub force_variant: Option<Option<Variant>>,
    #[serde(default, deserialize_with = "present")]
    pub coupon_code_a: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub coupon_code_b: Option<Option<String>>,
}

/// Maps a present field (including `null`) to `Some(..)`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn coupon_code(code: Option<String>) -> Option<String> {
    code.map(|c| normalize_code(&c)).filter(|c| !c.is_empty())
}

fn percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

impl ExperimentPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Returns the patched definition with a bumped version.
    pub fn apply(&self, current: &Experiment, now: DateTime<Utc>) -> Experiment {
        let mut next = current.clone();
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(traffic) = self.traffic {
            next.traffic_percent = percent(traffic);
        }
        if let Some(split_a) = self.split_a {
            next.split_percent_a = percent(split_a);
        }
        if let Some(force_variant) = self.force_variant {
            next.force_variant = force_variant;
        }
        if let Some(code) = &self.coupon_code_a {
            next.coupon_code_a = coupon_code(code.clone());
        }
        if let Some(code) = &self.coupon_code_b {
            next.coupon_code_b = coupon_code(code.clone());
        }
        next.version = current.version + 1;
        next.updated_at = now;
        next
    }
}
