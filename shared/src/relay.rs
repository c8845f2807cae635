//! Outbox relay.
//!
//! Stands in for a change-data-capture connector: it polls committed outbox
//! rows in commit order and republishes them, marking a row published only
//! after the bus acknowledged it. Delivery is at-least-once; a crash between
//! publish and mark re-sends the row, which consumers absorb idempotently.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::Publisher;
use crate::db::DbPool;
use crate::outbox::OutboxMessage;
use crate::schema::outbox_events;

#[async_trait]
pub trait OutboxSource: Send + Sync {
    /// Unpublished rows, oldest commit first.
    async fn unpublished(&self, limit: i64) -> Result<Vec<OutboxMessage>>;

    async fn mark_published(&self, id: Uuid) -> Result<()>;

    /// Deletes rows published at or before `cutoff`. Returns how many went.
    async fn purge_published(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[derive(Clone)]
pub struct PgOutbox {
    pool: DbPool,
}

impl PgOutbox {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxSource for PgOutbox {
    async fn unpublished(&self, limit: i64) -> Result<Vec<OutboxMessage>> {
        let mut conn = self.pool.get().await?;

        let rows = outbox_events::table
            .filter(outbox_events::published_at.is_null())
            .order(outbox_events::sequence.asc())
            .limit(limit)
            .select(OutboxMessage::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    async fn mark_published(&self, id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::update(outbox_events::table.find(id))
            .set(outbox_events::published_at.eq(Utc::now()))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn purge_published(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(
            outbox_events::table.filter(outbox_events::published_at.le(cutoff)),
        )
        .execute(&mut conn)
        .await?;

        Ok(deleted)
    }
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub interval: Duration,
    pub batch_size: i64,
    pub retention: Duration,
    pub purge_interval: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            batch_size: 100,
            retention: Duration::from_secs(24 * 60 * 60),
            purge_interval: Duration::from_secs(60 * 60),
        }
    }
}

pub struct OutboxRelay<S, P> {
    source: S,
    publisher: P,
    topic: String,
    settings: RelaySettings,
}

impl<S: OutboxSource, P: Publisher> OutboxRelay<S, P> {
    pub fn new(source: S, publisher: P, topic: impl Into<String>, settings: RelaySettings) -> Self {
        Self {
            source,
            publisher,
            topic: topic.into(),
            settings,
        }
    }

    pub async fn run(&self) {
        let mut publish_tick = time::interval(self.settings.interval);
        let mut purge_tick = time::interval(self.settings.purge_interval);
        info!(topic = %self.topic, "Outbox relay started");

        loop {
            tokio::select! {
                _ = publish_tick.tick() => {
                    if let Err(e) = self.relay_once().await {
                        error!("Error relaying outbox events: {:#}", e);
                    }
                }
                _ = purge_tick.tick() => {
                    if let Err(e) = self.purge().await {
                        error!("Error purging outbox events: {:#}", e);
                    }
                }
            }
        }
    }

    /// Publishes one batch. Stops at the first failure so that a later row for
    /// the same key can never overtake an earlier one.
    pub async fn relay_once(&self) -> Result<usize> {
        let pending = self.source.unpublished(self.settings.batch_size).await?;
        let mut published = 0;

        for message in pending {
            let body = message.body();
            if let Err(e) = self
                .publisher
                .publish(&self.topic, &message.aggregate_id, &body)
                .await
            {
                warn!(
                    event_id = %message.id,
                    aggregate_id = %message.aggregate_id,
                    "Failed to publish outbox event, will retry: {:#}", e
                );
                break;
            }

            self.source.mark_published(message.id).await?;
            published += 1;
            debug!(
                event_id = %message.id,
                event_type = %message.event_type,
                topic = %self.topic,
                "Published outbox event"
            );
        }

        Ok(published)
    }

    pub async fn purge(&self) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.settings.retention)?;
        let purged = self.source.purge_published(Utc::now() - retention).await?;
        if purged > 0 {
            info!(purged, "Purged published outbox events");
        }
        Ok(purged)
    }
}
