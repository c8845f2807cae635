//! Outbox append.
//!
//! A row is written with the same connection, inside the same transaction,
//! as the aggregate change it describes. The relay only ever sees committed
//! rows, so an event is observable exactly when its change committed.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::DomainEvent;
use crate::schema::outbox_events;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = outbox_events)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Builds the row for `event`.
    ///
    /// Fails only if the payload cannot be serialized; callers propagate the
    /// error out of their transaction so the aggregate change rolls back too.
    pub fn new<E: DomainEvent>(event: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_type: E::AGGREGATE_TYPE.to_string(),
            aggregate_id: event.aggregate_id(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
            created_at: Utc::now(),
        })
    }

    /// The payload as sent on the bus.
    pub fn body(&self) -> String {
        self.payload.to_string()
    }
}

/// Inserts `message` using the caller's (transactional) connection.
pub async fn append(conn: &mut AsyncPgConnection, message: &OutboxMessage) -> QueryResult<()> {
    diesel::insert_into(outbox_events::table)
        .values(message)
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InventoryEvent, StockMovement};

    #[test]
    fn row_mirrors_the_event() {
        let order_id = Uuid::new_v4();
        let event = InventoryEvent::InventoryReserved(StockMovement {
            order_id,
            product_id: "P1".to_string(),
            quantity: 5,
        });

        let message = OutboxMessage::new(&event).unwrap();

        assert_eq!(message.aggregate_type, "Order");
        assert_eq!(message.aggregate_id, order_id.to_string());
        assert_eq!(message.event_type, "InventoryReserved");
        assert_eq!(message.payload["type"], "InventoryReserved");
        assert_eq!(message.payload["quantity"], 5);
    }
}
