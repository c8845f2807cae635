use async_trait::async_trait;
use bigdecimal::BigDecimal;
use shared::topics::ORDER_EVENTS;
use shared::{decode, EventHandler, HandlerError, OrderEvent, OrderSnapshot};
use tracing::{debug, info, warn};

use crate::gateway::PaymentGateway;
use crate::models::Payment;
use crate::store::{PaymentStore, Recorded};

pub const SUBSCRIPTIONS: &[&str] = &[ORDER_EVENTS];

/// Charges orders that reached `PAYMENT_PENDING`, at most once per order.
pub struct PaymentHandler<S, G> {
    store: S,
    gateway: G,
    amount: BigDecimal,
}

impl<S: PaymentStore, G: PaymentGateway> PaymentHandler<S, G> {
    pub fn new(store: S, gateway: G, amount: BigDecimal) -> Self {
        Self {
            store,
            gateway,
            amount,
        }
    }

    async fn process(&self, order: OrderSnapshot) -> anyhow::Result<()> {
        let order_id = order.order_id;

        if let Some(existing) = self.store.find_by_order(order_id).await? {
            info!(%order_id, status = %existing.status, "Payment already processed, skipping");
            return Ok(());
        }

        let outcome = self.gateway.charge(order_id, &self.amount).await?;
        let payment = Payment::settle(order_id, self.amount.clone(), outcome);

        match self.store.record(payment).await? {
            Recorded::Recorded(p) => info!(
                %order_id,
                payment_id = %p.id,
                status = %p.status,
                amount = %p.amount,
                "Payment processed"
            ),
            Recorded::AlreadyRecorded(p) => info!(
                %order_id,
                status = %p.status,
                "Payment recorded concurrently, keeping the first one"
            ),
        }
        Ok(())
    }
}

#[async_trait]
impl<S: PaymentStore, G: PaymentGateway> EventHandler for PaymentHandler<S, G> {
    async fn handle(&self, topic: &str, payload: &str) -> Result<(), HandlerError> {
        if topic != ORDER_EVENTS {
            debug!(topic, "Ignoring message from unsubscribed topic");
            return Ok(());
        }

        let event = match decode::<OrderEvent>(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic, "Dropping malformed event: {}", e);
                return Ok(());
            }
        };

        match event {
            OrderEvent::OrderPaymentPending(order) => Ok(self.process(order).await?),
            other => {
                debug!(event_type = ?other, "Ignoring order event");
                Ok(())
            }
        }
    }
}
