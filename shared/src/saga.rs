//! Order status state machine.
//!
//! The order service is the only writer of an order's status, and the status
//! only moves when an inventory or payment event arrives:
//!
//! | current           | signal                       | next              | emits                 |
//! |-------------------|------------------------------|-------------------|-----------------------|
//! | `PENDING`         | `InventoryReserved`          | `PAYMENT_PENDING` | `OrderPaymentPending` |
//! | `PENDING`         | `InventoryReservationFailed` | `REJECTED`        | `OrderRejected`       |
//! | `PAYMENT_PENDING` | `PaymentSucceeded`           | `CONFIRMED`       | `OrderConfirmed`      |
//! | `PAYMENT_PENDING` | `PaymentFailed`              | `CANCELLED`       | `OrderCancelled`      |
//!
//! Any other pair is a no-op. Because an order never moves backwards, "the
//! signal does not apply to the current status" covers both duplicates and
//! late arrivals, so the table doubles as the idempotency check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{OrderEvent, OrderSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PaymentPending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PaymentPending => "PAYMENT_PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses are sticky: no signal moves an order out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// Looks up the transition for `signal`, or `None` when the signal has
    /// already been applied or is not valid from this status.
    pub fn transition(self, signal: SagaSignal) -> Option<Transition> {
        let (to, emits) = match (self, signal) {
            (OrderStatus::Pending, SagaSignal::InventoryReserved) => {
                (OrderStatus::PaymentPending, OrderEventKind::PaymentPending)
            }
            (OrderStatus::Pending, SagaSignal::InventoryReservationFailed) => {
                (OrderStatus::Rejected, OrderEventKind::Rejected)
            }
            (OrderStatus::PaymentPending, SagaSignal::PaymentSucceeded) => {
                (OrderStatus::Confirmed, OrderEventKind::Confirmed)
            }
            (OrderStatus::PaymentPending, SagaSignal::PaymentFailed) => {
                (OrderStatus::Cancelled, OrderEventKind::Cancelled)
            }
            _ => return None,
        };

        Some(Transition {
            from: self,
            to,
            emits,
        })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAYMENT_PENDING" => Ok(OrderStatus::PaymentPending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Inbound facts the order saga reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaSignal {
    InventoryReserved,
    InventoryReservationFailed,
    PaymentSucceeded,
    PaymentFailed,
}

/// Order event emitted alongside a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEventKind {
    Created,
    PaymentPending,
    Rejected,
    Confirmed,
    Cancelled,
}

impl OrderEventKind {
    pub fn into_event(self, snapshot: OrderSnapshot) -> OrderEvent {
        match self {
            OrderEventKind::Created => OrderEvent::OrderCreated(snapshot),
            OrderEventKind::PaymentPending => OrderEvent::OrderPaymentPending(snapshot),
            OrderEventKind::Rejected => OrderEvent::OrderRejected(snapshot),
            OrderEventKind::Confirmed => OrderEvent::OrderConfirmed(snapshot),
            OrderEventKind::Cancelled => OrderEvent::OrderCancelled(snapshot),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub emits: OrderEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::PaymentPending,
        OrderStatus::Confirmed,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
    ];

    const ALL_SIGNALS: [SagaSignal; 4] = [
        SagaSignal::InventoryReserved,
        SagaSignal::InventoryReservationFailed,
        SagaSignal::PaymentSucceeded,
        SagaSignal::PaymentFailed,
    ];

    #[test]
    fn valid_pairs_follow_the_table() {
        let cases = [
            (
                OrderStatus::Pending,
                SagaSignal::InventoryReserved,
                OrderStatus::PaymentPending,
                OrderEventKind::PaymentPending,
            ),
            (
                OrderStatus::Pending,
                SagaSignal::InventoryReservationFailed,
                OrderStatus::Rejected,
                OrderEventKind::Rejected,
            ),
            (
                OrderStatus::PaymentPending,
                SagaSignal::PaymentSucceeded,
                OrderStatus::Confirmed,
                OrderEventKind::Confirmed,
            ),
            (
                OrderStatus::PaymentPending,
                SagaSignal::PaymentFailed,
                OrderStatus::Cancelled,
                OrderEventKind::Cancelled,
            ),
        ];

        for (from, signal, to, emits) in cases {
            let transition = from.transition(signal).unwrap();
            assert_eq!(transition, Transition { from, to, emits });
        }
    }

    #[test]
    fn exactly_four_pairs_are_valid() {
        let valid = ALL_STATUSES
            .iter()
            .flat_map(|s| ALL_SIGNALS.iter().map(move |g| s.transition(*g)))
            .filter(Option::is_some)
            .count();
        assert_eq!(valid, 4);
    }

    #[test]
    fn terminal_statuses_are_sticky() {
        for status in ALL_STATUSES.iter().filter(|s| s.is_terminal()) {
            for signal in ALL_SIGNALS {
                assert_eq!(status.transition(signal), None, "{status} / {signal:?}");
            }
        }
    }

    #[test]
    fn late_reservation_after_payment_pending_is_ignored() {
        assert_eq!(
            OrderStatus::PaymentPending.transition(SagaSignal::InventoryReserved),
            None
        );
        assert_eq!(OrderStatus::Pending.transition(SagaSignal::PaymentSucceeded), None);
    }

    #[test]
    fn status_text_round_trips() {
        for status in ALL_STATUSES {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        let err = "APPROVED".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown order status: APPROVED");
    }

    #[test]
    fn status_serializes_in_screaming_case() {
        let json = serde_json::to_string(&OrderStatus::PaymentPending).unwrap();
        assert_eq!(json, "\"PAYMENT_PENDING\"");
    }
}
