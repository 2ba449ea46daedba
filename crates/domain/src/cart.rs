//! Shopper cart keyed by session token.

use chrono::{DateTime, Utc};
use common::{CartToken, Money, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::product::Product;

/// Errors from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Item not found: {product_id}")]
    ItemNotFound { product_id: ProductId },

    #[error("Quantity too large for {product_id}: {current} + {added}")]
    QuantityTooLarge {
        product_id: ProductId,
        current: u32,
        added: u32,
    },
}

/// A line in a cart, with the unit price captured when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    /// Returns quantity * unit_price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A shopper's cart.
///
/// Checkout never deletes the cart; a new order simply snapshots its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub token: CartToken,
    pub items: Vec<CartItem>,
    /// Normalized code of the coupon the shopper applied, if any.
    pub applied_coupon: Option<String>,
}

impl Cart {
    /// Creates an empty cart for a session.
    pub fn new(token: CartToken) -> Self {
        Self {
            token,
            items: Vec::new(),
            applied_coupon: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all line totals.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    /// Adds `quantity` units of a product at its current price.
    ///
    /// Adding a product already in the cart increases its quantity and keeps
    /// the originally captured price.
    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(existing) => {
                let current = existing.quantity;
                existing.quantity =
                    current
                        .checked_add(quantity)
                        .ok_or_else(|| CartError::QuantityTooLarge {
                            product_id: product.id.clone(),
                            current,
                            added: quantity,
                        })?;
            }
            None => self.items.push(CartItem {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                quantity,
                unit_price: product.price,
            }),
        }
        Ok(())
    }

    /// Sets the quantity of a line; zero removes it.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| &i.product_id == product_id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product_id.clone(),
            })?;
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &ProductId) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| &i.product_id != product_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound {
                product_id: product_id.clone(),
            });
        }
        Ok(())
    }
}

/// Abandoned-cart tracking for a session.
///
/// A tracked cart is recovered when its session later completes a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbandonedCart {
    pub token: CartToken,
    pub tracked_at: DateTime<Utc>,
    pub recovered_at: Option<DateTime<Utc>>,
}

impl AbandonedCart {
    pub fn is_recovered(&self) -> bool {
        self.recovered_at.is_some()
    }
}
