//! Command-line/environment fragments every service binary flattens into its
//! own `clap` parser.

use std::time::Duration;

use clap::Args;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::StreamConsumer;
use rdkafka::error::KafkaResult;
use rdkafka::producer::FutureProducer;

use crate::bus::KafkaPublisher;
use crate::consumer::RetryPolicy;
use crate::relay::RelaySettings;

#[derive(Debug, Clone, Args)]
pub struct KafkaArgs {
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub kafka_brokers: String,

    #[arg(long, env = "KAFKA_MESSAGE_TIMEOUT_MS", default_value_t = 5000)]
    pub message_timeout_ms: u64,
}

impl KafkaArgs {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn producer(&self) -> KafkaResult<FutureProducer> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.kafka_brokers)
            .set("message.timeout.ms", self.message_timeout_ms.to_string())
            .create()
    }

    pub fn publisher(&self) -> KafkaResult<KafkaPublisher> {
        Ok(KafkaPublisher::new(self.producer()?, self.message_timeout()))
    }

    /// Offsets are committed by the worker after each message, never
    /// automatically.
    pub fn consumer(&self, group_id: &str) -> KafkaResult<StreamConsumer> {
        ClientConfig::new()
            .set("group.id", group_id)
            .set("bootstrap.servers", &self.kafka_brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
    }
}

#[derive(Debug, Clone, Args)]
pub struct RetryArgs {
    #[arg(long, env = "RETRY_INITIAL_BACKOFF_MS", default_value_t = 1000)]
    pub retry_initial_backoff_ms: u64,

    #[arg(long, env = "RETRY_MULTIPLIER", default_value_t = 2.0)]
    pub retry_multiplier: f64,

    #[arg(long, env = "RETRY_MAX_BACKOFF_MS", default_value_t = 10_000)]
    pub retry_max_backoff_ms: u64,

    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: u32,
}

impl From<RetryArgs> for RetryPolicy {
    fn from(args: RetryArgs) -> Self {
        Self {
            initial_backoff: Duration::from_millis(args.retry_initial_backoff_ms),
            multiplier: args.retry_multiplier,
            max_backoff: Duration::from_millis(args.retry_max_backoff_ms),
            max_attempts: args.retry_max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RelayArgs {
    #[arg(long, env = "RELAY_INTERVAL_MS", default_value_t = 1000)]
    pub relay_interval_ms: u64,

    #[arg(long, env = "RELAY_BATCH_SIZE", default_value_t = 100)]
    pub relay_batch_size: i64,

    #[arg(long, env = "OUTBOX_RETENTION_HOURS", default_value_t = 24)]
    pub outbox_retention_hours: u64,
}

impl From<RelayArgs> for RelaySettings {
    fn from(args: RelayArgs) -> Self {
        Self {
            interval: Duration::from_millis(args.relay_interval_ms),
            batch_size: args.relay_batch_size,
            retention: Duration::from_secs(args.outbox_retention_hours * 60 * 60),
            ..Default::default()
        }
    }
}
