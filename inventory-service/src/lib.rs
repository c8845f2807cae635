//! Inventory service: owns stock per product and the reservation ledger.
//! Reserves and releases stock for orders and publishes `inventory.events`.

pub mod api;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod schema;
pub mod store;
