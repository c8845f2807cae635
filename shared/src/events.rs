//! Event vocabulary, one closed tagged union per topic.
//!
//! Payloads travel as JSON with a `type` tag and camelCase fields. A tag this
//! build does not know decodes to the `Unknown` variant so newer producers
//! never break older consumers; a known tag with missing fields is a decode
//! error and the consumer drops the message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::saga::{OrderStatus, SagaSignal};

pub mod topics {
    pub const ORDER_EVENTS: &str = "order.events";
    pub const INVENTORY_EVENTS: &str = "inventory.events";
    pub const PAYMENT_EVENTS: &str = "payment.events";
    pub const PRODUCT_EVENTS: &str = "product.events";

    pub fn dead_letter(topic: &str) -> String {
        format!("{topic}.DLT")
    }
}

/// An event a service writes to its outbox.
pub trait DomainEvent: Serialize {
    /// Aggregate type recorded on the outbox row.
    const AGGREGATE_TYPE: &'static str;

    fn event_type(&self) -> &'static str;

    /// Partition key on the bus. Every saga event is keyed by order id so all
    /// steps of one order stay in commit order.
    fn aggregate_id(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub user_id: String,
    pub product_id: String,
    pub quantity: i32,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderEvent {
    #[serde(alias = "OrderCreatedEvent")]
    OrderCreated(OrderSnapshot),
    #[serde(alias = "OrderPaymentPendingEvent")]
    OrderPaymentPending(OrderSnapshot),
    #[serde(alias = "OrderRejectedEvent")]
    OrderRejected(OrderSnapshot),
    #[serde(alias = "OrderConfirmedEvent")]
    OrderConfirmed(OrderSnapshot),
    #[serde(alias = "OrderCancelledEvent")]
    OrderCancelled(OrderSnapshot),
    #[serde(other)]
    Unknown,
}

impl OrderEvent {
    pub fn snapshot(&self) -> Option<&OrderSnapshot> {
        match self {
            OrderEvent::OrderCreated(s)
            | OrderEvent::OrderPaymentPending(s)
            | OrderEvent::OrderRejected(s)
            | OrderEvent::OrderConfirmed(s)
            | OrderEvent::OrderCancelled(s) => Some(s),
            OrderEvent::Unknown => None,
        }
    }
}

impl DomainEvent for OrderEvent {
    const AGGREGATE_TYPE: &'static str = "Order";

    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::OrderPaymentPending(_) => "OrderPaymentPending",
            OrderEvent::OrderRejected(_) => "OrderRejected",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::Unknown => "Unknown",
        }
    }

    fn aggregate_id(&self) -> String {
        self.snapshot()
            .map(|s| s.order_id.to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub order_id: Uuid,
    pub product_id: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InventoryEvent {
    #[serde(alias = "InventoryReservedEvent")]
    InventoryReserved(StockMovement),
    #[serde(alias = "InventoryFailedEvent")]
    InventoryReservationFailed(StockMovement),
    #[serde(alias = "InventoryReleasedEvent")]
    InventoryReleased(StockMovement),
    #[serde(other)]
    Unknown,
}

impl InventoryEvent {
    pub fn movement(&self) -> Option<&StockMovement> {
        match self {
            InventoryEvent::InventoryReserved(m)
            | InventoryEvent::InventoryReservationFailed(m)
            | InventoryEvent::InventoryReleased(m) => Some(m),
            InventoryEvent::Unknown => None,
        }
    }

    /// The saga signal this event carries for the order, if any.
    pub fn signal(&self) -> Option<(Uuid, SagaSignal)> {
        match self {
            InventoryEvent::InventoryReserved(m) => Some((m.order_id, SagaSignal::InventoryReserved)),
            InventoryEvent::InventoryReservationFailed(m) => {
                Some((m.order_id, SagaSignal::InventoryReservationFailed))
            }
            InventoryEvent::InventoryReleased(_) | InventoryEvent::Unknown => None,
        }
    }
}

impl DomainEvent for InventoryEvent {
    const AGGREGATE_TYPE: &'static str = "Order";

    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::InventoryReserved(_) => "InventoryReserved",
            InventoryEvent::InventoryReservationFailed(_) => "InventoryReservationFailed",
            InventoryEvent::InventoryReleased(_) => "InventoryReleased",
            InventoryEvent::Unknown => "Unknown",
        }
    }

    fn aggregate_id(&self) -> String {
        self.movement()
            .map(|m| m.order_id.to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDecline {
    pub order_id: Uuid,
    /// Absent on declines from producers that never stored a payment row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PaymentEvent {
    #[serde(alias = "PaymentProcessedEvent")]
    PaymentSucceeded(PaymentReceipt),
    #[serde(alias = "PaymentFailedEvent")]
    PaymentFailed(PaymentDecline),
    #[serde(other)]
    Unknown,
}

impl PaymentEvent {
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            PaymentEvent::PaymentSucceeded(r) => Some(r.order_id),
            PaymentEvent::PaymentFailed(d) => Some(d.order_id),
            PaymentEvent::Unknown => None,
        }
    }

    pub fn signal(&self) -> Option<(Uuid, SagaSignal)> {
        match self {
            PaymentEvent::PaymentSucceeded(r) => Some((r.order_id, SagaSignal::PaymentSucceeded)),
            PaymentEvent::PaymentFailed(d) => Some((d.order_id, SagaSignal::PaymentFailed)),
            PaymentEvent::Unknown => None,
        }
    }
}

impl DomainEvent for PaymentEvent {
    const AGGREGATE_TYPE: &'static str = "Order";

    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentSucceeded(_) => "PaymentSucceeded",
            PaymentEvent::PaymentFailed(_) => "PaymentFailed",
            PaymentEvent::Unknown => "Unknown",
        }
    }

    fn aggregate_id(&self) -> String {
        self.order_id().map(|id| id.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreated {
    #[serde(alias = "product_id")]
    pub product_id: String,
}

/// Events from the product catalogue. Inventory only cares about creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProductEvent {
    #[serde(alias = "ProductCreatedEvent")]
    ProductCreated(ProductCreated),
    #[serde(other)]
    Unknown,
}

/// Decodes a bus payload into `E`.
///
/// CDC transforms sometimes deliver the document as a JSON string holding the
/// JSON text; that extra layer is peeled off first. Producers that name the
/// event kind `eventType` instead of `type` are accepted too.
pub fn decode<E: DeserializeOwned>(payload: &str) -> Result<E, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let mut value = match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
        other => other,
    };
    if let serde_json::Value::Object(fields) = &mut value {
        if !fields.contains_key("type") {
            if let Some(kind) = fields.get("eventType").cloned() {
                fields.insert("type".to_string(), kind);
            }
        }
    }
    serde_json::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(status: OrderStatus) -> OrderSnapshot {
        OrderSnapshot {
            order_id: Uuid::new_v4(),
            user_id: "u-1".to_string(),
            product_id: "P1".to_string(),
            quantity: 5,
            status,
        }
    }

    #[test]
    fn order_event_carries_type_tag_and_camel_case_fields() {
        let event = OrderEvent::OrderPaymentPending(snapshot(OrderStatus::PaymentPending));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "OrderPaymentPending");
        assert_eq!(value["productId"], "P1");
        assert_eq!(value["status"], "PAYMENT_PENDING");
        assert_eq!(event.event_type(), "OrderPaymentPending");
    }

    #[test]
    fn unknown_type_decodes_to_unknown_variant() {
        let payload = json!({"type": "OrderShipped", "orderId": Uuid::new_v4()}).to_string();
        assert_eq!(decode::<OrderEvent>(&payload).unwrap(), OrderEvent::Unknown);
        assert_eq!(decode::<InventoryEvent>(&payload).unwrap(), InventoryEvent::Unknown);
        assert_eq!(decode::<PaymentEvent>(&payload).unwrap(), PaymentEvent::Unknown);
    }

    #[test]
    fn known_type_with_missing_fields_is_malformed() {
        let payload = json!({"type": "InventoryReserved", "productId": "P1"}).to_string();
        assert!(decode::<InventoryEvent>(&payload).is_err());
    }

    #[test]
    fn missing_type_tag_is_malformed() {
        let payload = json!({"orderId": Uuid::new_v4()}).to_string();
        assert!(decode::<PaymentEvent>(&payload).is_err());
    }

    #[test]
    fn legacy_tags_are_accepted() {
        let order_id = Uuid::new_v4();
        let payload = json!({
            "type": "InventoryFailedEvent",
            "orderId": order_id,
            "productId": "P2",
            "quantity": 5
        })
        .to_string();

        let event: InventoryEvent = decode(&payload).unwrap();
        assert_eq!(
            event.signal(),
            Some((order_id, SagaSignal::InventoryReservationFailed))
        );
    }

    #[test]
    fn double_encoded_payload_is_unwrapped() {
        let inner = json!({"type": "ProductCreated", "product_id": "P9"}).to_string();
        let payload = serde_json::to_string(&inner).unwrap();

        let event: ProductEvent = decode(&payload).unwrap();
        assert_eq!(
            event,
            ProductEvent::ProductCreated(ProductCreated {
                product_id: "P9".to_string()
            })
        );
    }

    #[test]
    fn event_type_field_stands_in_for_missing_type_tag() {
        let payload = json!({"eventType": "ProductCreated", "product_id": "P3"}).to_string();
        assert_eq!(
            decode::<ProductEvent>(&payload).unwrap(),
            ProductEvent::ProductCreated(ProductCreated {
                product_id: "P3".to_string()
            })
        );

        let both = json!({"type": "OrderShipped", "eventType": "ProductCreated"}).to_string();
        assert_eq!(decode::<ProductEvent>(&both).unwrap(), ProductEvent::Unknown);
    }

    #[test]
    fn legacy_payment_failure_without_payment_id_decodes() {
        let order_id = Uuid::new_v4();
        let payload = json!({
            "type": "PaymentFailedEvent",
            "orderId": order_id,
            "reason": "Payment declined"
        })
        .to_string();

        let event: PaymentEvent = decode(&payload).unwrap();
        assert_eq!(event.signal(), Some((order_id, SagaSignal::PaymentFailed)));
    }

    #[test]
    fn released_inventory_carries_no_saga_signal() {
        let event = InventoryEvent::InventoryReleased(StockMovement {
            order_id: Uuid::new_v4(),
            product_id: "P1".to_string(),
            quantity: 1,
        });
        assert_eq!(event.signal(), None);
    }

    #[test]
    fn every_saga_event_is_keyed_by_order_id() {
        let order_id = Uuid::new_v4();
        let event = PaymentEvent::PaymentFailed(PaymentDecline {
            order_id,
            payment_id: Some(Uuid::new_v4()),
            reason: "Payment declined".to_string(),
        });
        assert_eq!(event.aggregate_id(), order_id.to_string());
    }
}
