//! Shipping tracker.

use common::{OrderId, ShippingId};
use domain::{Money, Shipping, ShippingDetails, ShippingPatch, ShippingStatus, shipping_cost};
use store::Store;

use crate::actor::Actor;
use crate::error::{Result, ServiceError};

const LOCKED_MESSAGE: &str = "Shipping details can only be changed while the shipment is pending";

/// Creates shipping records and moves them forward one step at a time.
#[derive(Clone)]
pub struct ShippingService<S> {
    store: S,
}

impl<S: Store> ShippingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, details))]
    pub async fn create_shipping(
        &self,
        order_id: OrderId,
        details: ShippingDetails,
        actor: Actor,
    ) -> Result<Shipping> {
        self.store
            .get_order(order_id, actor.owner_filter())
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {order_id}")))?;

        if self.store.shipping_for_order(order_id).await?.is_some() {
            return Err(ServiceError::AlreadyExists(format!(
                "Shipping details already exist for order {order_id}"
            )));
        }

        let shipping = Shipping::new(order_id, details)?;
        self.store.insert_shipping(&shipping).await?;
        tracing::info!(shipping_id = %shipping.id, "shipping record created");
        Ok(shipping)
    }

    /// The order's shipping record, if the caller can see the order.
    pub async fn get_shipping(&self, order_id: OrderId, actor: Actor) -> Result<Shipping> {
        self.store
            .get_order(order_id, actor.owner_filter())
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Order {order_id}")))?;

        self.store
            .shipping_for_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Shipping for order {order_id}")))
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_shipping_details(
        &self,
        order_id: OrderId,
        actor: Actor,
        patch: ShippingPatch,
    ) -> Result<Shipping> {
        let shipping = self.get_shipping(order_id, actor).await?;
        if !shipping.status.is_editable() {
            return Err(ServiceError::Locked(LOCKED_MESSAGE.to_string()));
        }

        let details = patch.apply(shipping.details)?;
        self.store
            .update_shipping_details(shipping.id, &details)
            .await?
            .ok_or_else(|| ServiceError::Locked(LOCKED_MESSAGE.to_string()))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_shipping(&self, order_id: OrderId, actor: Actor) -> Result<()> {
        let shipping = self.get_shipping(order_id, actor).await?;
        if !shipping.status.is_editable() || !self.store.delete_shipping(shipping.id).await? {
            return Err(ServiceError::Locked(LOCKED_MESSAGE.to_string()));
        }
        Ok(())
    }

    /// Administrative status change; only the next step is accepted.
    #[tracing::instrument(skip(self))]
    pub async fn update_shipping_status(
        &self,
        shipping_id: ShippingId,
        status: ShippingStatus,
        tracking_number: Option<String>,
    ) -> Result<Shipping> {
        let shipping = self
            .store
            .get_shipping(shipping_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Shipping {shipping_id}")))?;

        shipping.status.check_transition(status)?;

        let tracking_number = tracking_number
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let updated = self
            .store
            .advance_shipping(shipping_id, shipping.status, status, tracking_number.as_deref())
            .await?
            .ok_or_else(|| ServiceError::InvalidTransition {
                from: shipping.status.to_string(),
                to: status.to_string(),
            })?;

        metrics::counter!("shipping_transitions_total", "status" => status.as_str()).increment(1);
        tracing::info!(shipping_id = %shipping_id, from = %shipping.status, to = %status, "shipping advanced");
        Ok(updated)
    }

    pub async fn list_by_status(&self, status: ShippingStatus) -> Result<Vec<Shipping>> {
        Ok(self.store.list_shipping(Some(status)).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Shipping>> {
        Ok(self.store.list_shipping(None).await?)
    }

    /// Flat delivery rate for a city.
    pub fn shipping_cost(&self, city: &str) -> Result<Money> {
        if city.trim().is_empty() {
            return Err(ServiceError::validation("city is required"));
        }
        Ok(shipping_cost(city))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderService;
    use crate::test_support::{seed_product, seed_user, shipping_details};
    use common::UserId;
    use store::InMemoryStore;

    async fn setup() -> (InMemoryStore, Actor, OrderId) {
        let store = InMemoryStore::new();
        let user = seed_user(&store).await;
        let product = seed_product(&store, 5, 100).await;
        let order = OrderService::new(store.clone())
            .create_order(user.id, &[(product.id, 1)])
            .await
            .unwrap();
        (store, Actor::customer(user.id), order.id)
    }

    #[tokio::test]
    async fn test_shipping_moves_forward_one_step() {
        let (store, actor, order_id) = setup().await;
        let service = ShippingService::new(store);
        let shipping = service
            .create_shipping(order_id, shipping_details(), actor)
            .await
            .unwrap();

        let skipped = service
            .update_shipping_status(shipping.id, ShippingStatus::Delivered, None)
            .await;
        assert!(matches!(skipped, Err(ServiceError::InvalidTransition { .. })));

        let mut current = shipping;
        for next in [
            ShippingStatus::Shipped,
            ShippingStatus::OutForDelivery,
            ShippingStatus::Delivered,
        ] {
            current = service
                .update_shipping_status(current.id, next, Some("TRK-9".to_string()))
                .await
                .unwrap();
            assert_eq!(current.status, next);
        }

        for target in ShippingStatus::ALL {
            let result = service.update_shipping_status(current.id, target, None).await;
            assert!(result.is_err());
        }
    }

    #[tokio::test]
    async fn test_one_record_per_order() {
        let (store, actor, order_id) = setup().await;
        let service = ShippingService::new(store);

        service
            .create_shipping(order_id, shipping_details(), actor)
            .await
            .unwrap();
        let duplicate = service.create_shipping(order_id, shipping_details(), actor).await;
        assert!(matches!(duplicate, Err(ServiceError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_only_order_owner_can_create() {
        let (store, _, order_id) = setup().await;
        let service = ShippingService::new(store);

        let result = service
            .create_shipping(order_id, shipping_details(), Actor::customer(UserId::new()))
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_details_locked_after_dispatch() {
        let (store, actor, order_id) = setup().await;
        let service = ShippingService::new(store);
        let shipping = service
            .create_shipping(order_id, shipping_details(), actor)
            .await
            .unwrap();

        let patch = ShippingPatch {
            city: Some("Kisumu".to_string()),
            ..ShippingPatch::default()
        };
        let edited = service
            .update_shipping_details(order_id, actor, patch.clone())
            .await
            .unwrap();
        assert_eq!(edited.details.city, "Kisumu");

        service
            .update_shipping_status(shipping.id, ShippingStatus::Shipped, None)
            .await
            .unwrap();

        assert!(matches!(
            service.update_shipping_details(order_id, actor, patch).await,
            Err(ServiceError::Locked(_))
        ));
        assert!(matches!(
            service.delete_shipping(order_id, actor).await,
            Err(ServiceError::Locked(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let (store, actor, order_id) = setup().await;
        let service = ShippingService::new(store);
        service
            .create_shipping(order_id, shipping_details(), actor)
            .await
            .unwrap();

        assert_eq!(service.list_by_status(ShippingStatus::Pending).await.unwrap().len(), 1);
        assert!(service.list_by_status(ShippingStatus::Shipped).await.unwrap().is_empty());
        assert_eq!(service.list_all().await.unwrap().len(), 1);
    }

    #[test]
    fn test_shipping_cost_requires_city() {
        let service = ShippingService::new(InMemoryStore::new());
        assert_eq!(service.shipping_cost("Mombasa").unwrap(), Money::from_units(500));
        assert!(service.shipping_cost("  ").is_err());
    }
}
