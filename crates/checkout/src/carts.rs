//! Cart reads and line mutations.

use std::sync::Arc;

use common::{CartToken, ProductId};
use domain::Cart;
use store::CommerceStore;

use crate::clock::Clock;
use crate::error::CartServiceError;

/// Cart store keyed by session token.
///
/// A cart that was never written reads back as an empty cart.
pub struct CartService<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: CommerceStore> CartService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get(&self, token: &CartToken) -> Result<Cart, CartServiceError> {
        Ok(self
            .store
            .get_cart(token)
            .await?
            .unwrap_or_else(|| Cart::new(token.clone())))
    }

    /// Adds a product at its current price.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        token: &CartToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart, CartServiceError> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| CartServiceError::ProductNotFound(product_id.clone()))?;

        let mut cart = self.get(token).await?;
        cart.add_item(&product, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Sets a line quantity; zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        token: &CartToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart, CartServiceError> {
        let mut cart = self.get(token).await?;
        cart.set_quantity(product_id, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        token: &CartToken,
        product_id: &ProductId,
    ) -> Result<Cart, CartServiceError> {
        let mut cart = self.get(token).await?;
        cart.remove_item(product_id)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Starts abandoned-cart tracking for a session.
    pub async fn track_abandoned(&self, token: &CartToken) -> Result<(), CartServiceError> {
        self.store
            .mark_cart_abandoned(token, self.clock.now())
            .await?;
        Ok(())
    }
}
