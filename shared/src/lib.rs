//! Building blocks shared by the order, inventory and payment services.
//!
//! Every service couples a local state change with an outbox row in one
//! transaction, a relay publishes committed rows onto Kafka, and consumers
//! apply the resulting events idempotently. This crate holds the pieces of
//! that protocol that do not belong to a single service: the event
//! vocabulary, the order status state machine, the outbox, the relay and the
//! consumer runtime.

pub mod bus;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod events;
pub mod outbox;
pub mod relay;
pub mod saga;
pub mod schema;
pub mod telemetry;

pub use consumer::{EventHandler, RetryPolicy};
pub use error::HandlerError;
pub use events::{
    decode, topics, DomainEvent, InventoryEvent, OrderEvent, OrderSnapshot, PaymentEvent,
    ProductEvent,
};
pub use outbox::OutboxMessage;
pub use saga::{OrderStatus, SagaSignal, Transition};
