use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};

/// Sends a keyed payload to a topic and resolves once the bus acknowledged it.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer, timeout: Duration) -> Self {
        Self { producer, timeout }
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        let record = FutureRecord::to(topic).payload(payload).key(key);

        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish to {}: {}", topic, e))?;

        Ok(())
    }
}
