//! Payment service: charges orders waiting for payment, at most once per
//! order, and publishes `payment.events`.

pub mod gateway;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod schema;
pub mod store;
