use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::events::StockMovement;
use shared::OutboxMessage;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    adjusted, decide, InventoryItem, InventoryPage, Reservation, ReservationDecision, ReservationStatus,
    StockLevel,
};
use crate::store::{InventoryStore, Released, Reserved};

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<String, InventoryItem>,
    reservations: HashMap<Uuid, Reservation>,
    outbox: Vec<OutboxMessage>,
}

impl State {
    fn upsert(&mut self, product_id: &str, quantity: i32) -> InventoryItem {
        let item = self
            .items
            .entry(product_id.to_string())
            .or_insert_with(|| InventoryItem::new(product_id, 0));
        item.quantity = quantity;
        item.updated_at = Utc::now();
        item.clone()
    }
}

/// In-memory inventory store guarded by a single lock, which stands in for
/// the row locks of the Postgres store.
#[derive(Debug, Clone, Default)]
pub struct MemoryInventoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn reservation(&self, order_id: Uuid) -> Option<Reservation> {
        self.state.lock().await.reservations.get(&order_id).cloned()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn reserve(&self, movement: StockMovement) -> Result<Reserved> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.reservations.get(&movement.order_id) {
            return Ok(Reserved::AlreadyDecided(existing.clone()));
        }

        let available = state.items.get(&movement.product_id).map(|i| i.quantity);
        let decision = decide(available, movement.quantity);
        let status = match decision {
            ReservationDecision::Reserve { .. } => ReservationStatus::Reserved,
            ReservationDecision::Reject => ReservationStatus::Rejected,
        };
        let reservation = Reservation::new(&movement, status);
        let message = reservation.event()?;

        if let ReservationDecision::Reserve { remaining } = decision {
            state.upsert(&movement.product_id, remaining);
        }
        state.reservations.insert(movement.order_id, reservation.clone());
        state.outbox.push(message);
        Ok(Reserved::Decided(reservation))
    }

    async fn release(&self, order_id: Uuid) -> Result<Released> {
        let mut state = self.state.lock().await;

        let Some(mut reservation) = state.reservations.get(&order_id).cloned() else {
            return Ok(Released::NothingReserved);
        };
        match reservation.status()? {
            ReservationStatus::Reserved => {}
            ReservationStatus::Released => return Ok(Released::AlreadyReleased),
            ReservationStatus::Rejected => return Ok(Released::NothingReserved),
        }

        let current = state
            .items
            .get(&reservation.product_id)
            .map(|i| i.quantity)
            .unwrap_or(0);
        let restored = current.checked_add(reservation.quantity).with_context(|| {
            format!("releasing {} overflows stock of {}", order_id, reservation.product_id)
        })?;

        reservation.status = ReservationStatus::Released.as_str().to_string();
        reservation.updated_at = Utc::now();
        let message = reservation.event()?;

        state.upsert(&reservation.product_id, restored);
        state.reservations.insert(order_id, reservation.clone());
        state.outbox.push(message);
        Ok(Released::Released(reservation))
    }

    async fn ensure_product(&self, product_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.items.contains_key(product_id) {
            return Ok(false);
        }
        state
            .items
            .insert(product_id.to_string(), InventoryItem::new(product_id, 0));
        Ok(true)
    }

    async fn stock(&self, product_id: &str) -> Result<StockLevel> {
        let state = self.state.lock().await;
        Ok(StockLevel::of(product_id, state.items.get(product_id)))
    }

    async fn stocks(&self, product_ids: &[String]) -> Result<Vec<StockLevel>> {
        let state = self.state.lock().await;
        Ok(product_ids
            .iter()
            .map(|id| StockLevel::of(id, state.items.get(id)))
            .collect())
    }

    async fn set_stock(&self, product_id: &str, quantity: i32) -> Result<InventoryItem> {
        Ok(self.state.lock().await.upsert(product_id, quantity))
    }

    async fn adjust_stock(&self, product_id: &str, delta: i32) -> Result<InventoryItem> {
        let mut state = self.state.lock().await;
        let current = state.items.get(product_id).map(|i| i.quantity).unwrap_or(0);
        Ok(state.upsert(product_id, adjusted(current, delta)))
    }

    async fn list(&self, page: i64, size: i64) -> Result<InventoryPage> {
        let offset = page
            .checked_mul(size)
            .with_context(|| format!("page {} of size {} is out of range", page, size))?;
        let state = self.state.lock().await;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(size).unwrap_or(0);

        Ok(InventoryPage {
            items: state
                .items
                .values()
                .skip(skip)
                .take(take)
                .map(StockLevel::from)
                .collect(),
            page,
            size,
            total_count: state.items.len() as i64,
        })
    }
}
