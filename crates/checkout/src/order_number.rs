use chrono::NaiveDate;
use domain::OrderNumber;
use store::StoreTransaction;

use crate::error::CheckoutError;

/// Hands out `{prefix}-{YYYYMMDD}-{sequence:06}` order numbers.
#[derive(Debug, Clone)]
pub struct OrderNumberGenerator {
    prefix: String,
    max_attempts: u32,
}

impl OrderNumberGenerator {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draws sequence values until one yields an unused number.
    ///
    /// Gives up with [`CheckoutError::OrderNumberExhausted`] after the
    /// configured number of attempts.
    pub async fn generate<T: StoreTransaction>(
        &self,
        tx: &mut T,
        date: NaiveDate,
    ) -> Result<OrderNumber, CheckoutError> {
        for attempt in 1..=self.max_attempts {
            let sequence = tx.next_order_sequence().await?;
            let candidate = OrderNumber::compose(&self.prefix, date, sequence);
            if !tx.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!(order_number = %candidate, attempt, "order number already taken");
        }
        Err(CheckoutError::OrderNumberExhausted {
            attempts: self.max_attempts,
        })
    }
}
