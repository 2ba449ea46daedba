//! Coupon eligibility inside the atomic scope.

use std::sync::Arc;

use common::{Money, UserId};
use domain::{Coupon, CouponRejection, normalize_code};
use store::StoreTransaction;

use crate::clock::Clock;
use crate::error::CouponCheckError;

/// A coupon that passed every check, with the discount it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCoupon {
    pub coupon: Coupon,
    pub discount: Money,
}

/// Decides whether a coupon is usable and computes its discount.
#[derive(Clone)]
pub struct CouponValidator {
    clock: Arc<dyn Clock>,
}

impl CouponValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Runs the checks in order and stops at the first failure: existence,
    /// active flag, validity window, minimum subtotal, global usage, per-user
    /// usage. The per-user check is skipped for guests.
    ///
    /// The coupon row stays locked by `tx`, so a usage inserted in the same
    /// scope cannot race another checkout for the last redemption.
    #[tracing::instrument(skip(self, tx))]
    pub async fn validate<T: StoreTransaction>(
        &self,
        tx: &mut T,
        code: &str,
        subtotal: Money,
        user: Option<&UserId>,
    ) -> Result<ValidatedCoupon, CouponCheckError> {
        let result = self.run_checks(tx, code, subtotal, user).await;

        let outcome = match &result {
            Ok(_) => "valid",
            Err(CouponCheckError::Rejected(reason)) => reason.code(),
            Err(CouponCheckError::Store(_)) => "error",
        };
        metrics::counter!("coupon_validations_total", "outcome" => outcome).increment(1);
        if let Err(CouponCheckError::Rejected(reason)) = &result {
            tracing::info!(reason = reason.code(), "coupon rejected");
        }
        result
    }

    async fn run_checks<T: StoreTransaction>(
        &self,
        tx: &mut T,
        code: &str,
        subtotal: Money,
        user: Option<&UserId>,
    ) -> Result<ValidatedCoupon, CouponCheckError> {
        let code = normalize_code(code);
        let coupon = tx
            .find_coupon_for_update(&code)
            .await?
            .ok_or(CouponRejection::NotFound)?;

        coupon.check_active_at(self.clock.now())?;
        coupon.check_minimum(subtotal)?;

        if coupon.usage_limit.is_some() {
            let used = tx.count_coupon_usages(coupon.id).await?;
            coupon.check_usage(used)?;
        }
        if let (Some(_), Some(user)) = (coupon.per_user_limit, user) {
            let used = tx.count_user_coupon_usages(coupon.id, user).await?;
            coupon.check_user_usage(used)?;
        }

        let discount = coupon.discount_for(subtotal);
        Ok(ValidatedCoupon { coupon, discount })
    }
}
