//! Placed orders and their payment status.

use chrono::{DateTime, NaiveDate, Utc};
use common::{Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::CartItem;
use crate::customer::CustomerInfo;

/// Human-readable, globally unique order number, e.g. `ORD-20261017-000042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Builds `{prefix}-{YYYYMMDD}-{sequence:06}`.
    pub fn compose(prefix: &str, date: NaiveDate, sequence: i64) -> Self {
        Self(format!("{prefix}-{}-{sequence:06}", date.format("%Y%m%d")))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid payment status transition: {from} -> {to}")]
pub struct PaymentStatusError {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

/// Payment lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Pending settles to paid or failed; only paid orders can be refunded.
    pub fn transition_to(self, next: PaymentStatus) -> Result<PaymentStatus, PaymentStatusError> {
        use PaymentStatus::*;
        match (self, next) {
            (Pending, Paid) | (Pending, Failed) | (Paid, Refunded) => Ok(next),
            (from, to) => Err(PaymentStatusError { from, to }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Snapshot of one purchased line, decoupled from the live product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total(),
        }
    }
}

/// A placed order.
///
/// Created exactly once per successful checkout; afterwards only
/// `payment_status` changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer: CustomerInfo,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub coupon_code: Option<String>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order from cart lines.
    ///
    /// The discount is clamped to the subtotal so the total is never negative.
    pub fn place(
        order_number: OrderNumber,
        customer: CustomerInfo,
        items: &[CartItem],
        discount: Money,
        coupon_code: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let lines: Vec<OrderLine> = items.iter().map(OrderLine::from).collect();
        let subtotal: Money = lines.iter().map(|l| l.line_total).sum();
        let discount = discount.max(Money::zero()).min(subtotal);

        Self {
            id: OrderId::new(),
            order_number,
            customer,
            lines,
            subtotal,
            discount,
            total_amount: subtotal.saturating_sub(discount),
            coupon_code,
            payment_status: PaymentStatus::Pending,
            created_at,
        }
    }
}
