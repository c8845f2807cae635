use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::saga::OrderEventKind;
use shared::{OrderSnapshot, OrderStatus, OutboxMessage, SagaSignal, Transition};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: String,
    pub quantity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a caller asks for when placing an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Caller-chosen id; one is generated when absent.
    pub order_id: Option<Uuid>,
    pub user_id: String,
    pub product_id: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidOrder {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i32),
    #[error("{0} must not be empty")]
    MissingField(&'static str),
}

impl Order {
    /// A fresh order in `PENDING`.
    pub fn place(request: NewOrder) -> Result<Self, InvalidOrder> {
        if request.user_id.trim().is_empty() {
            return Err(InvalidOrder::MissingField("userId"));
        }
        if request.product_id.trim().is_empty() {
            return Err(InvalidOrder::MissingField("productId"));
        }
        if request.quantity <= 0 {
            return Err(InvalidOrder::NonPositiveQuantity(request.quantity));
        }

        let now = Utc::now();
        Ok(Self {
            id: request.order_id.unwrap_or_else(Uuid::new_v4),
            user_id: request.user_id,
            product_id: request.product_id,
            quantity: request.quantity,
            status: OrderStatus::Pending.as_str().to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn status(&self) -> anyhow::Result<OrderStatus> {
        Ok(self.status.parse()?)
    }

    pub fn snapshot(&self) -> anyhow::Result<OrderSnapshot> {
        Ok(OrderSnapshot {
            order_id: self.id,
            user_id: self.user_id.clone(),
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            status: self.status()?,
        })
    }

    pub fn created_event(&self) -> anyhow::Result<OutboxMessage> {
        self.event(OrderEventKind::Created)
    }

    /// Applies `signal` to this order in memory.
    ///
    /// Returns the transition and the outbox row to write with it, or `None`
    /// (leaving the order untouched) when the signal was already applied or
    /// does not fit the current status.
    pub fn advance(&mut self, signal: SagaSignal) -> anyhow::Result<Option<(Transition, OutboxMessage)>> {
        let Some(transition) = self.status()?.transition(signal) else {
            return Ok(None);
        };

        self.status = transition.to.as_str().to_string();
        self.updated_at = Utc::now();
        let message = self.event(transition.emits)?;
        Ok(Some((transition, message)))
    }

    fn event(&self, kind: OrderEventKind) -> anyhow::Result<OutboxMessage> {
        let event = kind.into_event(self.snapshot()?);
        Ok(OutboxMessage::new(&event)?)
    }
}
