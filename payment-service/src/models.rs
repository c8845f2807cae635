use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::events::{PaymentDecline, PaymentReceipt};
use shared::{OutboxMessage, PaymentEvent};
use uuid::Uuid;

use crate::gateway::ChargeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

/// One payment per order, written once and never updated.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::payments)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub status: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn settle(order_id: Uuid, amount: BigDecimal, outcome: ChargeOutcome) -> Self {
        let (status, transaction_id, failure_reason) = match outcome {
            ChargeOutcome::Approved { transaction_id } => (PaymentStatus::Success, Some(transaction_id), None),
            ChargeOutcome::Declined { reason } => (PaymentStatus::Failed, None, Some(reason)),
        };

        Self {
            id: Uuid::new_v4(),
            order_id,
            amount,
            status: status.as_str().to_string(),
            transaction_id,
            failure_reason,
            created_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == PaymentStatus::Success.as_str()
    }

    pub fn event(&self) -> anyhow::Result<OutboxMessage> {
        let event = match (&self.transaction_id, self.succeeded()) {
            (Some(transaction_id), true) => PaymentEvent::PaymentSucceeded(PaymentReceipt {
                order_id: self.order_id,
                payment_id: self.id,
                transaction_id: transaction_id.clone(),
            }),
            (None, true) => anyhow::bail!("successful payment {} has no transaction id", self.id),
            (_, false) => PaymentEvent::PaymentFailed(PaymentDecline {
                order_id: self.order_id,
                payment_id: Some(self.id),
                reason: self.failure_reason.clone().unwrap_or_default(),
            }),
        };
        Ok(OutboxMessage::new(&event)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn amount() -> BigDecimal {
        BigDecimal::from_str("99.99").unwrap()
    }

    #[test]
    fn approved_charge_becomes_success_with_transaction() {
        let order_id = Uuid::new_v4();
        let payment = Payment::settle(
            order_id,
            amount(),
            ChargeOutcome::Approved {
                transaction_id: "tx-1".to_string(),
            },
        );

        assert!(payment.succeeded());
        let message = payment.event().unwrap();
        assert_eq!(message.event_type, "PaymentSucceeded");
        assert_eq!(message.aggregate_id, order_id.to_string());
        assert_eq!(message.payload["transactionId"], "tx-1");
    }

    #[test]
    fn declined_charge_becomes_failed_with_reason() {
        let payment = Payment::settle(
            Uuid::new_v4(),
            amount(),
            ChargeOutcome::Declined {
                reason: "Payment declined".to_string(),
            },
        );

        assert_eq!(payment.status, "FAILED");
        assert!(payment.transaction_id.is_none());
        let message = payment.event().unwrap();
        assert_eq!(message.event_type, "PaymentFailed");
        assert_eq!(message.payload["reason"], "Payment declined");
    }
}
