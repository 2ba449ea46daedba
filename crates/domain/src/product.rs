//! Catalog product as seen by checkout.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A product with its current price and stock tracking.
///
/// `available_quantity` only means something when `stock_limited` is set;
/// untracked products are always available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock_limited: bool,
    pub available_quantity: u32,
}

impl Product {
    /// Creates a product whose stock is not tracked.
    pub fn unlimited(id: impl Into<ProductId>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            stock_limited: false,
            available_quantity: 0,
        }
    }

    /// Creates a stock-limited product with the given available quantity.
    pub fn limited(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        available_quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            stock_limited: true,
            available_quantity,
        }
    }
}
