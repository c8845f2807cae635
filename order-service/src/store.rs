use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::db::DbPool;
use shared::{outbox, OrderStatus, SagaSignal, Transition};
use uuid::Uuid;

use crate::models::Order;
use crate::schema::orders;

#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    /// The order was inserted together with its `OrderCreated` event.
    Placed(Order),
    /// An order with this id already existed; nothing was written.
    Existing(Order),
}

impl Created {
    pub fn order(&self) -> &Order {
        match self {
            Created::Placed(order) | Created::Existing(order) => order,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Transitioned { order: Order, transition: Transition },
    /// Already applied, or not valid from the order's current status.
    Skipped { status: OrderStatus },
    NotFound,
}

/// Order aggregate store. Each method is one local transaction: the order
/// row and any outbox row commit together or not at all.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: Order) -> Result<Created>;

    async fn find(&self, id: Uuid) -> Result<Option<Order>>;

    /// Locks the order, runs it through the state machine and persists the
    /// transition with its follow-on event.
    async fn apply(&self, order_id: Uuid, signal: SagaSignal) -> Result<Applied>;
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: Order) -> Result<Created> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let message = order.created_event()?;

                let inserted = diesel::insert_into(orders::table)
                    .values(&order)
                    .on_conflict(orders::id)
                    .do_nothing()
                    .execute(conn)
                    .await?;

                if inserted == 0 {
                    let existing = orders::table
                        .find(order.id)
                        .select(Order::as_select())
                        .first(conn)
                        .await?;
                    return Ok(Created::Existing(existing));
                }

                outbox::append(conn, &message).await?;
                Ok(Created::Placed(order))
            }
            .scope_boxed()
        })
        .await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>> {
        let mut conn = self.pool.get().await?;

        let order = orders::table
            .find(id)
            .select(Order::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(order)
    }

    async fn apply(&self, order_id: Uuid, signal: SagaSignal) -> Result<Applied> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let order = orders::table
                    .find(order_id)
                    .select(Order::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;

                let Some(mut order) = order else {
                    return Ok(Applied::NotFound);
                };

                let status = order.status()?;
                let Some((transition, message)) = order.advance(signal)? else {
                    return Ok(Applied::Skipped { status });
                };

                diesel::update(orders::table.find(order_id))
                    .set((
                        orders::status.eq(&order.status),
                        orders::updated_at.eq(order.updated_at),
                    ))
                    .execute(conn)
                    .await?;

                outbox::append(conn, &message).await?;
                Ok(Applied::Transitioned { order, transition })
            }
            .scope_boxed()
        })
        .await
    }
}
