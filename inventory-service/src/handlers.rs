use async_trait::async_trait;
use shared::events::{ProductCreated, StockMovement};
use shared::topics::{ORDER_EVENTS, PRODUCT_EVENTS};
use shared::{decode, EventHandler, HandlerError, OrderEvent, OrderSnapshot, ProductEvent};
use tracing::{debug, info, warn};

use crate::store::{InventoryStore, Released, Reserved};

pub const SUBSCRIPTIONS: &[&str] = &[ORDER_EVENTS, PRODUCT_EVENTS];

/// Reserves stock for new orders, returns it for cancelled ones and creates
/// records for new products.
pub struct InventoryHandler<S> {
    store: S,
}

impl<S: InventoryStore> InventoryHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn on_order_event(&self, event: OrderEvent) -> anyhow::Result<()> {
        match event {
            OrderEvent::OrderCreated(order) => self.reserve(order).await,
            OrderEvent::OrderCancelled(order) => self.release(order).await,
            other => {
                debug!(event_type = ?other, "Ignoring order event");
                Ok(())
            }
        }
    }

    async fn reserve(&self, order: OrderSnapshot) -> anyhow::Result<()> {
        let movement = StockMovement {
            order_id: order.order_id,
            product_id: order.product_id,
            quantity: order.quantity,
        };

        match self.store.reserve(movement).await? {
            Reserved::Decided(r) => info!(
                order_id = %r.order_id,
                product_id = %r.product_id,
                quantity = r.quantity,
                status = %r.status,
                "Reservation decided"
            ),
            Reserved::AlreadyDecided(r) => info!(
                order_id = %r.order_id,
                status = %r.status,
                "Reservation already decided, skipping"
            ),
        }
        Ok(())
    }

    async fn release(&self, order: OrderSnapshot) -> anyhow::Result<()> {
        match self.store.release(order.order_id).await? {
            Released::Released(r) => info!(
                order_id = %r.order_id,
                product_id = %r.product_id,
                quantity = r.quantity,
                "Inventory reservation released"
            ),
            Released::AlreadyReleased => {
                info!(order_id = %order.order_id, "Reservation already released, skipping")
            }
            Released::NothingReserved => {
                info!(order_id = %order.order_id, "No stock held for order, nothing to release")
            }
        }
        Ok(())
    }

    async fn on_product_event(&self, event: ProductEvent) -> anyhow::Result<()> {
        match event {
            ProductEvent::ProductCreated(ProductCreated { product_id }) => {
                if self.store.ensure_product(&product_id).await? {
                    info!(%product_id, "Created inventory record for new product");
                } else {
                    debug!(%product_id, "Inventory record already exists");
                }
            }
            ProductEvent::Unknown => debug!("Ignoring product event"),
        }
        Ok(())
    }
}

#[async_trait]
impl<S: InventoryStore> EventHandler for InventoryHandler<S> {
    async fn handle(&self, topic: &str, payload: &str) -> Result<(), HandlerError> {
        let result = match topic {
            ORDER_EVENTS => match decode::<OrderEvent>(payload) {
                Ok(event) => self.on_order_event(event).await,
                Err(e) => {
                    warn!(topic, "Dropping malformed event: {}", e);
                    Ok(())
                }
            },
            PRODUCT_EVENTS => match decode::<ProductEvent>(payload) {
                Ok(event) => self.on_product_event(event).await,
                Err(e) => {
                    warn!(topic, "Dropping malformed event: {}", e);
                    Ok(())
                }
            },
            _ => {
                debug!(topic, "Ignoring message from unsubscribed topic");
                Ok(())
            }
        };

        result.map_err(HandlerError::from)
    }
}
