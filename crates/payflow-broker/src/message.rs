//! Transport-agnostic inbound message envelope.

use uuid::Uuid;

/// Header carrying the event subject used for routing.
pub const SUBJECT_HEADER: &str = "subject";
/// Header carrying the correlation id propagated across services.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// A message received from the broker, decoded as far as the transport
/// layer can take it. Handlers deserialize `body` into their own payload
/// types.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Routing subject taken from the transport header.
    pub subject: String,
    /// JSON message body.
    pub body: serde_json::Value,
    /// Correlation id from the transport header; a fresh id is minted when
    /// the producer did not send one, so downstream logs always correlate.
    pub correlation_id: Uuid,
}

impl InboundMessage {
    /// Builds a message with the given subject and body and a fresh
    /// correlation id.
    #[must_use]
    pub fn new(subject: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            subject: subject.into(),
            body,
            correlation_id: Uuid::new_v4(),
        }
    }
}
