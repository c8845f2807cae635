use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::db::DbPool;
use shared::events::StockMovement;
use shared::outbox;
use uuid::Uuid;

use crate::models::{
    adjusted, decide, InventoryItem, InventoryPage, Reservation, ReservationDecision, ReservationStatus,
    StockLevel,
};
use crate::schema::{inventory, reservations};

#[derive(Debug, Clone, PartialEq)]
pub enum Reserved {
    /// First answer for this order; the row and its event were written.
    Decided(Reservation),
    /// The order already has a ledger row; nothing changed.
    AlreadyDecided(Reservation),
}

impl Reserved {
    pub fn reservation(&self) -> &Reservation {
        match self {
            Reserved::Decided(r) | Reserved::AlreadyDecided(r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Released {
    Released(Reservation),
    AlreadyReleased,
    /// No stock was ever taken for the order (no row, or a rejected one).
    NothingReserved,
}

/// Inventory aggregate store. Reservation and release lock the product row
/// and the order's ledger row, and commit their outbox event with them.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn reserve(&self, movement: StockMovement) -> Result<Reserved>;

    async fn release(&self, order_id: Uuid) -> Result<Released>;

    /// Creates a zero-stock record unless one exists. Returns whether it did.
    async fn ensure_product(&self, product_id: &str) -> Result<bool>;

    async fn stock(&self, product_id: &str) -> Result<StockLevel>;

    /// Levels in request order; unknown products read as zero.
    async fn stocks(&self, product_ids: &[String]) -> Result<Vec<StockLevel>>;

    async fn set_stock(&self, product_id: &str, quantity: i32) -> Result<InventoryItem>;

    async fn adjust_stock(&self, product_id: &str, delta: i32) -> Result<InventoryItem>;

    async fn list(&self, page: i64, size: i64) -> Result<InventoryPage>;
}

#[derive(Clone)]
pub struct PgInventoryStore {
    pool: DbPool,
}

impl PgInventoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn reserve(&self, movement: StockMovement) -> Result<Reserved> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let available = inventory::table
                    .find(&movement.product_id)
                    .select(inventory::quantity)
                    .for_update()
                    .first::<i32>(conn)
                    .await
                    .optional()?;

                let existing = reservations::table
                    .find(movement.order_id)
                    .select(Reservation::as_select())
                    .first(conn)
                    .await
                    .optional()?;
                if let Some(existing) = existing {
                    return Ok(Reserved::AlreadyDecided(existing));
                }

                let decision = decide(available, movement.quantity);
                let status = match decision {
                    ReservationDecision::Reserve { .. } => ReservationStatus::Reserved,
                    ReservationDecision::Reject => ReservationStatus::Rejected,
                };
                let reservation = Reservation::new(&movement, status);
                let message = reservation.event()?;

                let inserted = diesel::insert_into(reservations::table)
                    .values(&reservation)
                    .on_conflict(reservations::order_id)
                    .do_nothing()
                    .execute(conn)
                    .await?;
                if inserted == 0 {
                    let existing = reservations::table
                        .find(movement.order_id)
                        .select(Reservation::as_select())
                        .first(conn)
                        .await?;
                    return Ok(Reserved::AlreadyDecided(existing));
                }

                if let ReservationDecision::Reserve { remaining } = decision {
                    diesel::update(inventory::table.find(&movement.product_id))
                        .set((
                            inventory::quantity.eq(remaining),
                            inventory::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                }

                outbox::append(conn, &message).await?;
                Ok(Reserved::Decided(reservation))
            }
            .scope_boxed()
        })
        .await
    }

    async fn release(&self, order_id: Uuid) -> Result<Released> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let reservation = reservations::table
                    .find(order_id)
                    .select(Reservation::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;

                let Some(mut reservation) = reservation else {
                    return Ok(Released::NothingReserved);
                };
                match reservation.status()? {
                    ReservationStatus::Reserved => {}
                    ReservationStatus::Released => return Ok(Released::AlreadyReleased),
                    ReservationStatus::Rejected => return Ok(Released::NothingReserved),
                }

                let current = inventory::table
                    .find(&reservation.product_id)
                    .select(inventory::quantity)
                    .for_update()
                    .first::<i32>(conn)
                    .await
                    .optional()?
                    .unwrap_or(0);
                let restored = current.checked_add(reservation.quantity).with_context(|| {
                    format!("releasing {} overflows stock of {}", order_id, reservation.product_id)
                })?;

                let now = Utc::now();
                reservation.status = ReservationStatus::Released.as_str().to_string();
                reservation.updated_at = now;
                let message = reservation.event()?;

                diesel::insert_into(inventory::table)
                    .values(InventoryItem::new(&reservation.product_id, restored))
                    .on_conflict(inventory::product_id)
                    .do_update()
                    .set((inventory::quantity.eq(restored), inventory::updated_at.eq(now)))
                    .execute(conn)
                    .await?;

                diesel::update(reservations::table.find(order_id))
                    .set((
                        reservations::status.eq(&reservation.status),
                        reservations::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                outbox::append(conn, &message).await?;
                Ok(Released::Released(reservation))
            }
            .scope_boxed()
        })
        .await
    }

    async fn ensure_product(&self, product_id: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let inserted = diesel::insert_into(inventory::table)
            .values(InventoryItem::new(product_id, 0))
            .on_conflict(inventory::product_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(inserted > 0)
    }

    async fn stock(&self, product_id: &str) -> Result<StockLevel> {
        let mut conn = self.pool.get().await?;

        let item = inventory::table
            .find(product_id)
            .select(InventoryItem::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(StockLevel::of(product_id, item.as_ref()))
    }

    async fn stocks(&self, product_ids: &[String]) -> Result<Vec<StockLevel>> {
        let mut conn = self.pool.get().await?;

        let items: Vec<InventoryItem> = inventory::table
            .filter(inventory::product_id.eq_any(product_ids))
            .select(InventoryItem::as_select())
            .load(&mut conn)
            .await?;

        Ok(product_ids
            .iter()
            .map(|id| StockLevel::of(id, items.iter().find(|i| &i.product_id == id)))
            .collect())
    }

    async fn set_stock(&self, product_id: &str, quantity: i32) -> Result<InventoryItem> {
        let mut conn = self.pool.get().await?;

        let item = diesel::insert_into(inventory::table)
            .values(InventoryItem::new(product_id, quantity))
            .on_conflict(inventory::product_id)
            .do_update()
            .set((
                inventory::quantity.eq(quantity),
                inventory::updated_at.eq(Utc::now()),
            ))
            .returning(InventoryItem::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(item)
    }

    async fn adjust_stock(&self, product_id: &str, delta: i32) -> Result<InventoryItem> {
        let mut conn = self.pool.get().await?;
        let product_id = product_id.to_string();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let current = inventory::table
                    .find(&product_id)
                    .select(inventory::quantity)
                    .for_update()
                    .first::<i32>(conn)
                    .await
                    .optional()?;
                let quantity = adjusted(current.unwrap_or(0), delta);

                let item = diesel::insert_into(inventory::table)
                    .values(InventoryItem::new(&product_id, quantity))
                    .on_conflict(inventory::product_id)
                    .do_update()
                    .set((
                        inventory::quantity.eq(quantity),
                        inventory::updated_at.eq(Utc::now()),
                    ))
                    .returning(InventoryItem::as_returning())
                    .get_result(conn)
                    .await?;

                Ok(item)
            }
            .scope_boxed()
        })
        .await
    }

    async fn list(&self, page: i64, size: i64) -> Result<InventoryPage> {
        let offset = page
            .checked_mul(size)
            .with_context(|| format!("page {} of size {} is out of range", page, size))?;
        let mut conn = self.pool.get().await?;

        let total_count = inventory::table.count().get_result::<i64>(&mut conn).await?;
        let items: Vec<InventoryItem> = inventory::table
            .order(inventory::product_id.asc())
            .limit(size)
            .offset(offset)
            .select(InventoryItem::as_select())
            .load(&mut conn)
            .await?;

        Ok(InventoryPage {
            items: items.iter().map(StockLevel::from).collect(),
            page,
            size,
            total_count,
        })
    }
}
