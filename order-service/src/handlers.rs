use async_trait::async_trait;
use shared::topics::{INVENTORY_EVENTS, PAYMENT_EVENTS};
use shared::{decode, EventHandler, HandlerError, InventoryEvent, PaymentEvent, SagaSignal};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{Applied, OrderStore};

pub const SUBSCRIPTIONS: &[&str] = &[INVENTORY_EVENTS, PAYMENT_EVENTS];

/// Drives the order status from inventory and payment outcomes.
pub struct OrderSagaHandler<S> {
    store: S,
}

impl<S: OrderStore> OrderSagaHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn signal(topic: &str, payload: &str) -> Option<(Uuid, SagaSignal)> {
        let decoded = match topic {
            INVENTORY_EVENTS => decode::<InventoryEvent>(payload).map(|e| e.signal()),
            PAYMENT_EVENTS => decode::<PaymentEvent>(payload).map(|e| e.signal()),
            _ => {
                debug!(topic, "Ignoring message from unsubscribed topic");
                return None;
            }
        };

        match decoded {
            Ok(signal) => signal,
            Err(e) => {
                warn!(topic, "Dropping malformed event: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl<S: OrderStore> EventHandler for OrderSagaHandler<S> {
    async fn handle(&self, topic: &str, payload: &str) -> Result<(), HandlerError> {
        let Some((order_id, signal)) = Self::signal(topic, payload) else {
            return Ok(());
        };

        info!(%order_id, ?signal, "Processing saga event");

        match self.store.apply(order_id, signal).await? {
            Applied::Transitioned { transition, .. } => {
                info!(
                    %order_id,
                    from = %transition.from,
                    to = %transition.to,
                    "Order status changed"
                );
            }
            Applied::Skipped { status } => {
                info!(%order_id, %status, ?signal, "Event already applied or not valid for status, skipping");
            }
            Applied::NotFound => {
                warn!(%order_id, "Order not found for event");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryOrderStore;
    use crate::models::{NewOrder, Order};
    use serde_json::json;
    use shared::OrderStatus;

    async fn pending_order(store: &MemoryOrderStore) -> Uuid {
        let order = Order::place(NewOrder {
            order_id: None,
            user_id: "user-1".to_string(),
            product_id: "P1".to_string(),
            quantity: 5,
        })
        .unwrap();
        store.create(order).await.unwrap().order().id
    }

    fn inventory(kind: &str, order_id: Uuid) -> String {
        json!({"type": kind, "orderId": order_id, "productId": "P1", "quantity": 5}).to_string()
    }

    fn payment_succeeded(order_id: Uuid) -> String {
        json!({
            "type": "PaymentSucceeded",
            "orderId": order_id,
            "paymentId": Uuid::new_v4(),
            "transactionId": "tx-1"
        })
        .to_string()
    }

    fn payment_failed(order_id: Uuid) -> String {
        json!({
            "type": "PaymentFailed",
            "orderId": order_id,
            "paymentId": Uuid::new_v4(),
            "reason": "Payment declined"
        })
        .to_string()
    }

    async fn status(store: &MemoryOrderStore, id: Uuid) -> OrderStatus {
        store.find(id).await.unwrap().unwrap().status().unwrap()
    }

    #[tokio::test]
    async fn reservation_moves_order_to_payment_pending() {
        let store = MemoryOrderStore::new();
        let id = pending_order(&store).await;
        let handler = OrderSagaHandler::new(store.clone());

        handler
            .handle(INVENTORY_EVENTS, &inventory("InventoryReserved", id))
            .await
            .unwrap();

        assert_eq!(status(&store, id).await, OrderStatus::PaymentPending);
        let outbox = store.outbox().await;
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[1].event_type, "OrderPaymentPending");
    }

    #[tokio::test]
    async fn failed_reservation_rejects_order() {
        let store = MemoryOrderStore::new();
        let id = pending_order(&store).await;
        let handler = OrderSagaHandler::new(store.clone());

        handler
            .handle(INVENTORY_EVENTS, &inventory("InventoryReservationFailed", id))
            .await
            .unwrap();

        assert_eq!(status(&store, id).await, OrderStatus::Rejected);
        assert_eq!(store.outbox().await[1].event_type, "OrderRejected");
    }

    #[tokio::test]
    async fn payment_outcomes_finish_the_saga() {
        let store = MemoryOrderStore::new();
        let handler = OrderSagaHandler::new(store.clone());

        let confirmed = pending_order(&store).await;
        handler
            .handle(INVENTORY_EVENTS, &inventory("InventoryReserved", confirmed))
            .await
            .unwrap();
        handler
            .handle(PAYMENT_EVENTS, &payment_succeeded(confirmed))
            .await
            .unwrap();
        assert_eq!(status(&store, confirmed).await, OrderStatus::Confirmed);

        let cancelled = pending_order(&store).await;
        handler
            .handle(INVENTORY_EVENTS, &inventory("InventoryReserved", cancelled))
            .await
            .unwrap();
        handler
            .handle(PAYMENT_EVENTS, &payment_failed(cancelled))
            .await
            .unwrap();
        assert_eq!(status(&store, cancelled).await, OrderStatus::Cancelled);

        let types: Vec<_> = store
            .outbox()
            .await
            .into_iter()
            .map(|m| m.event_type)
            .collect();
        assert!(types.contains(&"OrderConfirmed".to_string()));
        assert!(types.contains(&"OrderCancelled".to_string()));
    }

    #[tokio::test]
    async fn duplicate_event_emits_once() {
        let store = MemoryOrderStore::new();
        let id = pending_order(&store).await;
        let handler = OrderSagaHandler::new(store.clone());
        let payload = inventory("InventoryReserved", id);

        handler.handle(INVENTORY_EVENTS, &payload).await.unwrap();
        let after_first = store.find(id).await.unwrap();
        handler.handle(INVENTORY_EVENTS, &payload).await.unwrap();

        assert_eq!(store.find(id).await.unwrap(), after_first);
        assert_eq!(store.outbox().await.len(), 2);
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let store = MemoryOrderStore::new();
        let id = pending_order(&store).await;
        let handler = OrderSagaHandler::new(store.clone());

        handler
            .handle(INVENTORY_EVENTS, &inventory("InventoryReservationFailed", id))
            .await
            .unwrap();
        handler
            .handle(INVENTORY_EVENTS, &inventory("InventoryReserved", id))
            .await
            .unwrap();
        handler
            .handle(PAYMENT_EVENTS, &payment_succeeded(id))
            .await
            .unwrap();

        assert_eq!(status(&store, id).await, OrderStatus::Rejected);
        assert_eq!(store.outbox().await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_and_malformed_events_are_acknowledged() {
        let store = MemoryOrderStore::new();
        let id = pending_order(&store).await;
        let handler = OrderSagaHandler::new(store.clone());

        let unknown = json!({"type": "InventoryAudited", "orderId": id}).to_string();
        handler.handle(INVENTORY_EVENTS, &unknown).await.unwrap();
        handler
            .handle(INVENTORY_EVENTS, r#"{"type":"InventoryReserved"}"#)
            .await
            .unwrap();
        handler.handle(PAYMENT_EVENTS, "not json").await.unwrap();

        assert_eq!(status(&store, id).await, OrderStatus::Pending);
        assert_eq!(store.outbox().await.len(), 1);
    }

    #[tokio::test]
    async fn event_for_missing_order_is_dropped() {
        let store = MemoryOrderStore::new();
        let handler = OrderSagaHandler::new(store.clone());

        handler
            .handle(INVENTORY_EVENTS, &inventory("InventoryReserved", Uuid::new_v4()))
            .await
            .unwrap();

        assert!(store.outbox().await.is_empty());
    }
}
