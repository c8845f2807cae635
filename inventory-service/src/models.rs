use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::events::StockMovement;
use shared::{InventoryEvent, OutboxMessage};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::inventory)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub product_id: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn new(product_id: impl Into<String>, quantity: i32) -> Self {
        let now = Utc::now();
        Self {
            product_id: product_id.into(),
            quantity,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stock as the read endpoints report it. A product without a record reads
/// as zero and unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub product_id: String,
    pub quantity: i32,
    pub is_available: bool,
}

impl StockLevel {
    pub fn of(product_id: &str, item: Option<&InventoryItem>) -> Self {
        let quantity = item.map(|i| i.quantity).unwrap_or(0);
        Self {
            product_id: product_id.to_string(),
            quantity,
            is_available: quantity > 0,
        }
    }
}

impl From<&InventoryItem> for StockLevel {
    fn from(item: &InventoryItem) -> Self {
        Self::of(&item.product_id, Some(item))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPage {
    pub items: Vec<StockLevel>,
    pub page: i64,
    pub size: i64,
    pub total_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Stock was taken for the order and may be released.
    Reserved,
    /// Not enough stock; nothing was taken.
    Rejected,
    /// Stock was returned after the order was cancelled.
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Rejected => "REJECTED",
            ReservationStatus::Released => "RELEASED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown reservation status {0:?}")]
pub struct UnknownReservationStatus(pub String);

impl FromStr for ReservationStatus {
    type Err = UnknownReservationStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESERVED" => Ok(ReservationStatus::Reserved),
            "REJECTED" => Ok(ReservationStatus::Rejected),
            "RELEASED" => Ok(ReservationStatus::Released),
            other => Err(UnknownReservationStatus(other.to_string())),
        }
    }
}

/// Ledger row, one per order. Its existence means the reservation request
/// for that order was already answered.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = crate::schema::reservations)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub order_id: Uuid,
    pub product_id: String,
    pub quantity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(movement: &StockMovement, status: ReservationStatus) -> Self {
        let now = Utc::now();
        Self {
            order_id: movement.order_id,
            product_id: movement.product_id.clone(),
            quantity: movement.quantity,
            status: status.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> anyhow::Result<ReservationStatus> {
        Ok(self.status.parse()?)
    }

    pub fn movement(&self) -> StockMovement {
        StockMovement {
            order_id: self.order_id,
            product_id: self.product_id.clone(),
            quantity: self.quantity,
        }
    }

    /// The event announcing this row's current status.
    pub fn event(&self) -> anyhow::Result<OutboxMessage> {
        let movement = self.movement();
        let event = match self.status()? {
            ReservationStatus::Reserved => InventoryEvent::InventoryReserved(movement),
            ReservationStatus::Rejected => InventoryEvent::InventoryReservationFailed(movement),
            ReservationStatus::Released => InventoryEvent::InventoryReleased(movement),
        };
        Ok(OutboxMessage::new(&event)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationDecision {
    Reserve { remaining: i32 },
    Reject,
}

/// Decides a reservation against the locked stock level. A missing record
/// counts as zero stock.
pub fn decide(available: Option<i32>, requested: i32) -> ReservationDecision {
    match available {
        Some(quantity) if requested > 0 && quantity >= requested => ReservationDecision::Reserve {
            remaining: quantity - requested,
        },
        _ => ReservationDecision::Reject,
    }
}

/// Applies a stock delta, flooring at zero.
pub fn adjusted(current: i32, delta: i32) -> i32 {
    current.saturating_add(delta).max(0)
}
