use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::{OutboxMessage, SagaSignal};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::Order;
use crate::store::{Applied, Created, OrderStore};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    outbox: Vec<OutboxMessage>,
}

/// In-memory order store. One lock covers orders and outbox, so a mutation
/// and its event land together.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderStore {
    state: Arc<Mutex<State>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbox rows in commit order.
    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.clone()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: Order) -> Result<Created> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.orders.get(&order.id) {
            return Ok(Created::Existing(existing.clone()));
        }

        let message = order.created_event()?;
        state.orders.insert(order.id, order.clone());
        state.outbox.push(message);
        Ok(Created::Placed(order))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn apply(&self, order_id: Uuid, signal: SagaSignal) -> Result<Applied> {
        let mut state = self.state.lock().await;

        let Some(mut order) = state.orders.get(&order_id).cloned() else {
            return Ok(Applied::NotFound);
        };

        let status = order.status()?;
        let Some((transition, message)) = order.advance(signal)? else {
            return Ok(Applied::Skipped { status });
        };

        state.orders.insert(order_id, order.clone());
        state.outbox.push(message);
        Ok(Applied::Transitioned { order, transition })
    }
}
