//! Coupon definitions, eligibility rules and redemption records.

use chrono::{DateTime, Utc};
use common::{CouponId, CouponUsageId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalizes a shopper-entered code: whitespace removed, upper-cased.
///
/// Codes are stored normalized, so lookups compare normalized forms only.
pub fn normalize_code(code: &str) -> String {
    code.split_whitespace()
        .collect::<String>()
        .to_uppercase()
}

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiscountKind {
    /// `value` is an amount in minor units.
    Fixed,
    /// `value` is a whole percentage of the subtotal.
    Percent,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Fixed => "FIXED",
            DiscountKind::Percent => "PERCENT",
        }
    }
}

impl std::str::FromStr for DiscountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIXED" => Ok(DiscountKind::Fixed),
            "PERCENT" => Ok(DiscountKind::Percent),
            other => Err(format!("unknown discount kind: {other}")),
        }
    }
}

/// Why a coupon cannot be used.
///
/// Checkout only cares that the coupon is invalid; the specific reason is
/// kept for logs and the coupon apply endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("Coupon not found")]
    NotFound,

    #[error("Coupon is inactive")]
    Inactive,

    #[error("Coupon is not valid yet")]
    NotYetStarted,

    #[error("Coupon has expired")]
    Expired,

    #[error("Order subtotal {subtotal} is below the coupon minimum {minimum}")]
    BelowMinimum { minimum: Money, subtotal: Money },

    #[error("Coupon usage limit reached")]
    UsageExhausted,

    #[error("Coupon already used the maximum number of times by this customer")]
    PerUserExhausted,
}

impl CouponRejection {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "not_found",
            CouponRejection::Inactive => "inactive",
            CouponRejection::NotYetStarted => "not_yet_started",
            CouponRejection::Expired => "expired",
            CouponRejection::BelowMinimum { .. } => "below_minimum",
            CouponRejection::UsageExhausted => "usage_exhausted",
            CouponRejection::PerUserExhausted => "per_user_exhausted",
        }
    }
}

/// A discount code definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Normalized code, unique across coupons.
    pub code: String,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_amount: Option<Money>,
    /// Caps `Percent` discounts.
    pub max_discount_amount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub per_user_limit: Option<u32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    fn with_kind(code: &str, kind: DiscountKind, value: i64) -> Self {
        Self {
            id: CouponId::new(),
            code: normalize_code(code),
            kind,
            value,
            min_order_amount: None,
            max_discount_amount: None,
            usage_limit: None,
            per_user_limit: None,
            starts_at: None,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// An active, unbounded fixed-amount coupon.
    pub fn fixed(code: &str, amount: Money) -> Self {
        Self::with_kind(code, DiscountKind::Fixed, amount.cents())
    }

    /// An active, unbounded percentage coupon.
    pub fn percent(code: &str, percent: i64) -> Self {
        Self::with_kind(code, DiscountKind::Percent, percent)
    }

    pub fn with_min_order(mut self, minimum: Money) -> Self {
        self.min_order_amount = Some(minimum);
        self
    }

    pub fn with_max_discount(mut self, cap: Money) -> Self {
        self.max_discount_amount = Some(cap);
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_per_user_limit(mut self, limit: u32) -> Self {
        self.per_user_limit = Some(limit);
        self
    }

    pub fn with_window(
        mut self,
        starts_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_at = starts_at;
        self.expires_at = expires_at;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Active flag and validity window; a missing bound is open on that side.
    pub fn check_active_at(&self, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if let Some(starts_at) = self.starts_at
            && now < starts_at
        {
            return Err(CouponRejection::NotYetStarted);
        }
        if let Some(expires_at) = self.expires_at
            && now > expires_at
        {
            return Err(CouponRejection::Expired);
        }
        Ok(())
    }

    pub fn check_minimum(&self, subtotal: Money) -> Result<(), CouponRejection> {
        match self.min_order_amount {
            Some(minimum) if subtotal < minimum => {
                Err(CouponRejection::BelowMinimum { minimum, subtotal })
            }
            _ => Ok(()),
        }
    }

    /// `used` is the number of redemptions recorded so far.
    pub fn check_usage(&self, used: u64) -> Result<(), CouponRejection> {
        match self.usage_limit {
            Some(limit) if used >= u64::from(limit) => Err(CouponRejection::UsageExhausted),
            _ => Ok(()),
        }
    }

    /// `used` is the number of redemptions by one identity.
    pub fn check_user_usage(&self, used: u64) -> Result<(), CouponRejection> {
        match self.per_user_limit {
            Some(limit) if used >= u64::from(limit) => Err(CouponRejection::PerUserExhausted),
            _ => Ok(()),
        }
    }

    /// Discount this coupon grants on `subtotal`; never exceeds it.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let subtotal = subtotal.max(Money::zero());
        let raw = match self.kind {
            DiscountKind::Fixed => Money::from_cents(self.value.max(0)),
            DiscountKind::Percent => {
                let pct = subtotal.percent_floor(self.value.max(0));
                match self.max_discount_amount {
                    Some(cap) => pct.min(cap.max(Money::zero())),
                    None => pct,
                }
            }
        };
        raw.min(subtotal)
    }
}

/// One redemption of a coupon by one order. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsage {
    pub id: CouponUsageId,
    pub coupon_id: CouponId,
    pub order_id: OrderId,
    pub user_id: Option<UserId>,
    pub discount_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl CouponUsage {
    pub fn new(
        coupon_id: CouponId,
        order_id: OrderId,
        user_id: Option<UserId>,
        discount_amount: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CouponUsageId::new(),
            coupon_id,
            order_id,
            user_id,
            discount_amount,
            created_at,
        }
    }
}
