//! Runs the whole saga in process: the three services' in-memory stores and
//! handlers, with their outboxes relayed to each other by a tiny bus.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use inventory_service::handlers::InventoryHandler;
use inventory_service::memory::MemoryInventoryStore;
use inventory_service::store::InventoryStore;
use order_service::handlers::OrderSagaHandler;
use order_service::memory::MemoryOrderStore;
use order_service::models::{NewOrder, Order};
use order_service::store::OrderStore;
use payment_service::gateway::SimulatedGateway;
use payment_service::handlers::PaymentHandler;
use payment_service::memory::MemoryPaymentStore;
use payment_service::store::PaymentStore;
use shared::topics::{INVENTORY_EVENTS, ORDER_EVENTS, PAYMENT_EVENTS};
use shared::{EventHandler, OrderStatus, OutboxMessage};
use uuid::Uuid;

struct Saga {
    orders: MemoryOrderStore,
    inventory: MemoryInventoryStore,
    payments: MemoryPaymentStore,
    order_handler: OrderSagaHandler<MemoryOrderStore>,
    inventory_handler: InventoryHandler<MemoryInventoryStore>,
    payment_handler: PaymentHandler<MemoryPaymentStore, SimulatedGateway>,
    /// Relayed rows per outbox: orders, inventory, payments.
    relayed: [usize; 3],
    /// Deliver every message twice, as an at-least-once bus may.
    duplicate: bool,
    delivered: Vec<(String, OutboxMessage)>,
}

impl Saga {
    fn new(payments_succeed: bool) -> Self {
        let orders = MemoryOrderStore::new();
        let inventory = MemoryInventoryStore::new();
        let payments = MemoryPaymentStore::new();
        let success_rate = if payments_succeed { 1.0 } else { 0.0 };

        Self {
            order_handler: OrderSagaHandler::new(orders.clone()),
            inventory_handler: InventoryHandler::new(inventory.clone()),
            payment_handler: PaymentHandler::new(
                payments.clone(),
                SimulatedGateway::new(success_rate),
                BigDecimal::from_str("99.99").unwrap(),
            ),
            orders,
            inventory,
            payments,
            relayed: [0; 3],
            duplicate: false,
            delivered: Vec::new(),
        }
    }

    async fn place(&self, product_id: &str, quantity: i32) -> Uuid {
        let order = Order::place(NewOrder {
            order_id: None,
            user_id: "user-1".to_string(),
            product_id: product_id.to_string(),
            quantity,
        })
        .unwrap();
        self.orders.create(order).await.unwrap().order().id
    }

    async fn deliver(&self, topic: &str, message: &OutboxMessage) {
        let body = message.body();
        let subscribers: Vec<&dyn EventHandler> = match topic {
            ORDER_EVENTS => vec![&self.inventory_handler as &dyn EventHandler, &self.payment_handler],
            _ => vec![&self.order_handler],
        };
        for handler in subscribers {
            handler.handle(topic, &body).await.unwrap();
        }
    }

    /// Relays outbox rows until every outbox is drained.
    async fn settle(&mut self) {
        loop {
            let outboxes = [
                (ORDER_EVENTS, self.orders.outbox().await),
                (INVENTORY_EVENTS, self.inventory.outbox().await),
                (PAYMENT_EVENTS, self.payments.outbox().await),
            ];

            let mut pending = Vec::new();
            for (i, (topic, rows)) in outboxes.into_iter().enumerate() {
                for row in rows.into_iter().skip(self.relayed[i]) {
                    pending.push((topic, row));
                    self.relayed[i] += 1;
                }
            }
            if pending.is_empty() {
                return;
            }

            for (topic, message) in pending {
                self.deliver(topic, &message).await;
                if self.duplicate {
                    self.deliver(topic, &message).await;
                }
                self.delivered.push((topic.to_string(), message));
            }
        }
    }

    async fn status(&self, order_id: Uuid) -> OrderStatus {
        self.orders
            .find(order_id)
            .await
            .unwrap()
            .unwrap()
            .status()
            .unwrap()
    }

    async fn stock(&self, product_id: &str) -> i32 {
        self.inventory.stock(product_id).await.unwrap().quantity
    }

    fn event_types(&self, topic: &str) -> Vec<String> {
        self.delivered
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.event_type.clone())
            .collect()
    }
}

#[tokio::test]
async fn reserved_and_paid_order_is_confirmed() {
    let mut saga = Saga::new(true);
    saga.inventory.set_stock("P1", 10).await.unwrap();

    let order_id = saga.place("P1", 5).await;
    saga.settle().await;

    assert_eq!(saga.status(order_id).await, OrderStatus::Confirmed);
    assert_eq!(saga.stock("P1").await, 5);
    let payment = saga.payments.find_by_order(order_id).await.unwrap().unwrap();
    assert_eq!(payment.status, "SUCCESS");
    assert_eq!(
        saga.event_types(ORDER_EVENTS),
        ["OrderCreated", "OrderPaymentPending", "OrderConfirmed"]
    );
}

#[tokio::test]
async fn scenario_a_reservation_moves_order_to_payment_pending() {
    let saga = Saga::new(true);
    saga.inventory.set_stock("P1", 10).await.unwrap();

    let order_id = saga.place("P1", 5).await;
    // Relay only the order and inventory outboxes once each.
    for message in saga.orders.outbox().await {
        saga.deliver(ORDER_EVENTS, &message).await;
    }
    for message in saga.inventory.outbox().await {
        saga.deliver(INVENTORY_EVENTS, &message).await;
    }

    assert_eq!(saga.stock("P1").await, 5);
    assert_eq!(saga.status(order_id).await, OrderStatus::PaymentPending);
}

#[tokio::test]
async fn scenario_b_insufficient_stock_rejects_order() {
    let mut saga = Saga::new(true);
    saga.inventory.set_stock("P2", 2).await.unwrap();

    let order_id = saga.place("P2", 5).await;
    saga.settle().await;

    assert_eq!(saga.status(order_id).await, OrderStatus::Rejected);
    assert_eq!(saga.stock("P2").await, 2);
    assert!(saga.payments.find_by_order(order_id).await.unwrap().is_none());
    assert_eq!(saga.event_types(INVENTORY_EVENTS), ["InventoryReservationFailed"]);
}

#[tokio::test]
async fn scenario_c_declined_payment_cancels_and_restores_stock_once() {
    let mut saga = Saga::new(false);
    saga.inventory.set_stock("P1", 10).await.unwrap();

    let order_id = saga.place("P1", 5).await;
    saga.settle().await;

    assert_eq!(saga.status(order_id).await, OrderStatus::Cancelled);
    let payment = saga.payments.find_by_order(order_id).await.unwrap().unwrap();
    assert_eq!(payment.status, "FAILED");
    assert_eq!(saga.stock("P1").await, 10);

    // The bus redelivers the cancellation.
    let cancelled = saga
        .delivered
        .iter()
        .find(|(_, m)| m.event_type == "OrderCancelled")
        .map(|(_, m)| m.clone())
        .unwrap();
    saga.deliver(ORDER_EVENTS, &cancelled).await;
    saga.settle().await;

    assert_eq!(saga.stock("P1").await, 10);
    assert_eq!(
        saga.event_types(INVENTORY_EVENTS),
        ["InventoryReserved", "InventoryReleased"]
    );
}

#[tokio::test]
async fn duplicate_delivery_of_every_event_changes_nothing() {
    let mut saga = Saga::new(false);
    saga.duplicate = true;
    saga.inventory.set_stock("P1", 10).await.unwrap();
    saga.inventory.set_stock("P2", 2).await.unwrap();

    let cancelled = saga.place("P1", 5).await;
    let rejected = saga.place("P2", 5).await;
    saga.settle().await;

    assert_eq!(saga.status(cancelled).await, OrderStatus::Cancelled);
    assert_eq!(saga.status(rejected).await, OrderStatus::Rejected);
    assert_eq!(saga.stock("P1").await, 10);
    assert_eq!(saga.stock("P2").await, 2);
    assert_eq!(saga.payments.payments().await.len(), 1);
    assert_eq!(saga.orders.outbox().await.len(), 5);
}

#[tokio::test]
async fn stock_never_goes_negative_across_many_orders() {
    let mut saga = Saga::new(false);
    saga.inventory.set_stock("P1", 7).await.unwrap();

    let mut orders = Vec::new();
    for quantity in [3, 3, 3, 1, 5] {
        orders.push(saga.place("P1", quantity).await);
    }
    saga.settle().await;

    assert_eq!(saga.stock("P1").await, 7);
    for order_id in orders {
        assert!(saga.status(order_id).await.is_terminal());
    }
}
