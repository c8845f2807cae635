use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::db::DbPool;
use shared::outbox;
use uuid::Uuid;

use crate::models::Payment;
use crate::schema::payments;

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Recorded(Payment),
    /// A payment for the order already existed; it is returned unchanged.
    AlreadyRecorded(Payment),
}

/// Payment store. `order_id` is unique, so a second payment for the same
/// order can never be written.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_by_order(&self, order_id: Uuid) -> Result<Option<Payment>>;

    /// Inserts the payment and its event together, unless the order already
    /// has one.
    async fn record(&self, payment: Payment) -> Result<Recorded>;
}

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_by_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        let mut conn = self.pool.get().await?;

        let payment = payments::table
            .filter(payments::order_id.eq(order_id))
            .select(Payment::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(payment)
    }

    async fn record(&self, payment: Payment) -> Result<Recorded> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let message = payment.event()?;

                let inserted = diesel::insert_into(payments::table)
                    .values(&payment)
                    .on_conflict(payments::order_id)
                    .do_nothing()
                    .execute(conn)
                    .await?;

                if inserted == 0 {
                    let existing = payments::table
                        .filter(payments::order_id.eq(payment.order_id))
                        .select(Payment::as_select())
                        .first(conn)
                        .await?;
                    return Ok(Recorded::AlreadyRecorded(existing));
                }

                outbox::append(conn, &message).await?;
                Ok(Recorded::Recorded(payment))
            }
            .scope_boxed()
        })
        .await
    }
}
