use async_trait::async_trait;
use bigdecimal::BigDecimal;
use uuid::Uuid;

pub const DECLINED: &str = "Payment declined";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}

/// One charge attempt. The outcome is final; there is no pending state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order_id: Uuid, amount: &BigDecimal) -> anyhow::Result<ChargeOutcome>;
}

/// Approves a random share of charges.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    success_rate: f64,
}

impl SimulatedGateway {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, _order_id: Uuid, _amount: &BigDecimal) -> anyhow::Result<ChargeOutcome> {
        let should_succeed = rand::random::<f64>() < self.success_rate;

        Ok(if should_succeed {
            ChargeOutcome::Approved {
                transaction_id: Uuid::new_v4().to_string(),
            }
        } else {
            ChargeOutcome::Declined {
                reason: DECLINED.to_string(),
            }
        })
    }
}
