//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type shared by every Payflow service.
///
/// The variants mirror the outcomes a caller can act on: client errors
/// (`Validation`, `NotFound`, `AlreadyProcessed`, `UnsupportedPaymentType`),
/// the recorded-but-declined payment outcome (`PaymentDeclined`), the
/// optimistic-concurrency signal (`VersionConflict`, resolved by re-reading
/// and retrying the whole use case), and infrastructure failures.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A payment or upstream order item was not found.
    #[error("not found: {0}")]
    NotFound(Uuid),

    /// The payment already reached a terminal state; re-processing is refused.
    #[error("payment {0} has already been processed")]
    AlreadyProcessed(Uuid),

    /// The payment capability executed and declined the payment. The Failed
    /// event is durably recorded before this error is surfaced.
    #[error("payment {0} was declined")]
    PaymentDeclined(Uuid),

    /// Optimistic concurrency conflict on an event-stream append.
    #[error("version conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// The aggregate whose stream rejected the append.
        aggregate_id: Uuid,
        /// The version the caller expected.
        expected: i64,
        /// The version actually at the stream head.
        actual: i64,
    },

    /// A validation error in request or domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A payment-type discriminant that is not part of the closed enumeration.
    #[error("unsupported payment type: {0}")]
    UnsupportedPaymentType(String),

    /// Broker or upstream-service transport failure; retried by redelivery
    /// or backoff at the infrastructure boundary.
    #[error("transport error: {0}")]
    Transport(String),

    /// Database, serialization, or other infrastructure error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
