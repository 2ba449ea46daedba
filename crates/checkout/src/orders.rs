//! Order reads and payment status changes.

use common::OrderId;
use domain::{Order, PaymentStatus};
use store::CommerceStore;

use crate::error::OrderError;

pub struct OrderService<S> {
    store: S,
}

impl<S: CommerceStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: OrderId) -> Result<Order, OrderError> {
        self.store
            .get_order(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    /// Records a payment outcome reported by the payment collaborator.
    ///
    /// The transition is checked against the current status and applied
    /// only if the status has not changed in the meantime.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: OrderId,
        next: PaymentStatus,
    ) -> Result<Order, OrderError> {
        let mut order = self.get(id).await?;
        let current = order.payment_status;
        current.transition_to(next)?;

        if !self
            .store
            .transition_payment_status(id, current, next)
            .await?
        {
            return Err(OrderError::Conflict(id));
        }

        tracing::info!(order_id = %id, from = %current, to = %next, "payment status changed");
        order.payment_status = next;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::Money;
    use domain::{CustomerInfo, OrderNumber};
    use store::{InMemoryCommerceStore, StoreTransaction};

    use super::*;

    async fn placed(store: &InMemoryCommerceStore) -> OrderId {
        let order = Order::place(
            OrderNumber::from_string("ORD-1"),
            CustomerInfo::default(),
            &[],
            Money::zero(),
            None,
            Utc::now(),
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        order.id
    }

    #[tokio::test]
    async fn pending_order_can_be_paid_then_refunded() {
        let store = InMemoryCommerceStore::new();
        let id = placed(&store).await;
        let service = OrderService::new(store);

        let paid = service.update_payment_status(id, PaymentStatus::Paid).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        let refunded = service
            .update_payment_status(id, PaymentStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let store = InMemoryCommerceStore::new();
        let id = placed(&store).await;
        let service = OrderService::new(store);

        assert!(matches!(
            service.update_payment_status(id, PaymentStatus::Refunded).await,
            Err(OrderError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let service = OrderService::new(InMemoryCommerceStore::new());
        assert!(matches!(
            service.get(OrderId::new()).await,
            Err(OrderError::NotFound(_))
        ));
    }
}
