//! Consumer runtime.
//!
//! Messages of one partition are handled strictly one after another and the
//! offset is committed only once a message is finished with: handled,
//! dropped as malformed, or parked on the dead-letter topic.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use tracing::{error, info, warn};

use crate::bus::Publisher;
use crate::error::HandlerError;
use crate::events::topics;

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Applies one message from `topic`.
    ///
    /// Returning `Ok` acknowledges the message, including when it was a
    /// duplicate, carried an unknown event type, or could not be decoded.
    async fn handle(&self, topic: &str, payload: &str) -> Result<(), HandlerError>;
}

/// Exponential backoff shared by transient and poison failures. Only poison
/// failures are bounded by `max_attempts`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Handled { attempts: u32 },
    DeadLettered { attempts: u32, reason: String },
}

/// Runs `handler` on one message until it succeeds or is given up on.
pub async fn deliver<H>(handler: &H, topic: &str, payload: &str, policy: &RetryPolicy) -> Delivery
where
    H: EventHandler + ?Sized,
{
    let mut attempts = 0;
    let mut poison_attempts = 0;

    loop {
        attempts += 1;
        let err = match handler.handle(topic, payload).await {
            Ok(()) => return Delivery::Handled { attempts },
            Err(err) => err,
        };

        let delay = match &err {
            HandlerError::Transient(_) => {
                warn!(topic, attempts, "Transient failure, retrying: {}", err);
                policy.backoff(attempts)
            }
            HandlerError::Poison(_) => {
                poison_attempts += 1;
                if poison_attempts >= policy.max_attempts {
                    error!(topic, attempts, "Giving up on message: {}", err);
                    return Delivery::DeadLettered {
                        attempts,
                        reason: err.to_string(),
                    };
                }
                warn!(topic, attempts, "Retry attempt {} failed: {}", poison_attempts, err);
                policy.backoff(poison_attempts)
            }
        };

        tokio::time::sleep(delay).await;
    }
}

/// Publishes `payload` to the dead-letter topic of `topic`, retrying until the
/// bus accepts it; the offset must not move past a message that is in neither
/// place.
pub async fn dead_letter<P>(publisher: &P, topic: &str, key: &str, payload: &str, policy: &RetryPolicy)
where
    P: Publisher + ?Sized,
{
    let target = topics::dead_letter(topic);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match publisher.publish(&target, key, payload).await {
            Ok(()) => {
                error!(topic, key, dead_letter_topic = %target, "Sent message to DLQ");
                return;
            }
            Err(e) => {
                warn!(dead_letter_topic = %target, "Failed to publish to DLQ: {:#}", e);
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }
    }
}

pub struct ConsumerWorker<H, P> {
    consumer: StreamConsumer,
    handler: H,
    dead_letters: P,
    policy: RetryPolicy,
}

impl<H: EventHandler, P: Publisher> ConsumerWorker<H, P> {
    pub fn new(consumer: StreamConsumer, handler: H, dead_letters: P, policy: RetryPolicy) -> Self {
        Self {
            consumer,
            handler,
            dead_letters,
            policy,
        }
    }

    pub async fn run(&self) {
        let mut message_stream = self.consumer.stream();
        info!("Consumer worker started");

        while let Some(message) = message_stream.next().await {
            let m = match message {
                Ok(m) => m,
                Err(e) => {
                    error!("Error receiving message: {}", e);
                    continue;
                }
            };

            let topic = m.topic();
            let key = m
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .unwrap_or_default();

            match m.payload_view::<str>() {
                Some(Ok(payload)) => {
                    if let Delivery::DeadLettered { .. } =
                        deliver(&self.handler, topic, payload, &self.policy).await
                    {
                        dead_letter(&self.dead_letters, topic, &key, payload, &self.policy).await;
                    }
                }
                Some(Err(e)) => warn!(topic, key = %key, "Dropping non UTF-8 payload: {}", e),
                None => warn!(topic, key = %key, "Dropping message without payload"),
            }

            if let Err(e) = self.consumer.commit_message(&m, CommitMode::Async) {
                error!("Error committing message: {}", e);
            }
        }
    }
}
