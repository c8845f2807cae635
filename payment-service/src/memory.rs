use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::OutboxMessage;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::Payment;
use crate::store::{PaymentStore, Recorded};

#[derive(Debug, Default)]
struct State {
    by_order: HashMap<Uuid, Payment>,
    outbox: Vec<OutboxMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPaymentStore {
    state: Arc<Mutex<State>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.by_order.values().cloned().collect()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn find_by_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        Ok(self.state.lock().await.by_order.get(&order_id).cloned())
    }

    async fn record(&self, payment: Payment) -> Result<Recorded> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.by_order.get(&payment.order_id) {
            return Ok(Recorded::AlreadyRecorded(existing.clone()));
        }

        let message = payment.event()?;
        state.by_order.insert(payment.order_id, payment.clone());
        state.outbox.push(message);
        Ok(Recorded::Recorded(payment))
    }
}
