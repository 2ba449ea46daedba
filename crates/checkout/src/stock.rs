//! Stock reservation ledger.

use common::ProductId;
use domain::CartItem;
use store::StoreTransaction;

use crate::error::ReservationError;

/// The only place stock is mutated.
///
/// A reservation is a single conditional decrement in the store. There is no
/// release: a failed checkout drops its transaction, which undoes any earlier
/// reservations of the same attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockLedger;

impl StockLedger {
    pub fn new() -> Self {
        Self
    }

    /// Reserves every line of a cart inside `tx`, stopping at the first
    /// shortfall.
    ///
    /// Lines are reserved in product id order so concurrent scopes take
    /// product row locks in the same order.
    pub async fn reserve_lines<T: StoreTransaction>(
        &self,
        tx: &mut T,
        items: &[CartItem],
    ) -> Result<(), ReservationError> {
        let mut lines: Vec<&CartItem> = items.iter().collect();
        lines.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        for item in lines {
            self.reserve(tx, &item.product_id, item.quantity).await?;
        }
        Ok(())
    }

    /// Reserves `quantity` units of a product inside `tx`.
    ///
    /// Products that are not stock-limited always succeed without a write.
    #[tracing::instrument(skip(self, tx))]
    pub async fn reserve<T: StoreTransaction>(
        &self,
        tx: &mut T,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ReservationError> {
        let product = tx
            .get_product(product_id)
            .await?
            .ok_or_else(|| ReservationError::UnknownProduct(product_id.clone()))?;

        if !product.stock_limited {
            metrics::counter!("stock_reservations_total", "outcome" => "untracked").increment(1);
            return Ok(());
        }

        if tx.decrement_stock(product_id, quantity).await? == 1 {
            metrics::counter!("stock_reservations_total", "outcome" => "reserved").increment(1);
            Ok(())
        } else {
            metrics::counter!("stock_reservations_total", "outcome" => "insufficient")
                .increment(1);
            tracing::info!(%product_id, quantity, "insufficient stock");
            Err(ReservationError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
            })
        }
    }
}
