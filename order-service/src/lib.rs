//! Order service: owns the order aggregate and its status. Reacts to
//! inventory and payment outcomes and publishes `order.events`.

pub mod api;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod schema;
pub mod store;
