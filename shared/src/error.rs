use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use thiserror::Error;

/// Why a handler could not finish processing a message.
///
/// Business outcomes (insufficient stock, declined charge) are not errors;
/// they are ordinary transitions with their own events. Malformed payloads are
/// not errors either; handlers log and acknowledge them.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The store or bus is unreachable. Retried with backoff until it comes
    /// back; the message is not acknowledged in the meantime.
    #[error("transient infrastructure failure: {0:#}")]
    Transient(anyhow::Error),

    /// Processing failed for another reason. Retried a bounded number of
    /// times, then routed to the dead-letter topic.
    #[error("processing failed: {0:#}")]
    Poison(anyhow::Error),
}

impl HandlerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }

    /// Sorts an infrastructure error into transient or poison by looking for
    /// connection-level failures anywhere in its cause chain.
    pub fn classify(err: anyhow::Error) -> Self {
        if err.chain().any(is_transient_cause) {
            HandlerError::Transient(err)
        } else {
            HandlerError::Poison(err)
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::classify(err)
    }
}

fn is_transient_cause(cause: &(dyn std::error::Error + 'static)) -> bool {
    if let Some(err) = cause.downcast_ref::<DieselError>() {
        return match err {
            DieselError::DatabaseError(kind, _) => matches!(
                kind,
                DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::ClosedConnection
            ),
            DieselError::BrokenTransactionManager => true,
            _ => false,
        };
    }

    cause.is::<PoolError>()
        || cause.is::<bb8::RunError<PoolError>>()
        || cause.is::<diesel::ConnectionError>()
        || cause.is::<std::io::Error>()
}
