//! Subject-based dispatch of inbound messages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use payflow_core::error::DomainError;

use crate::message::InboundMessage;

/// Processes one inbound message.
///
/// Handlers run under at-least-once delivery: the same message may arrive
/// more than once, so every handler must be idempotent. Returning an error
/// triggers redelivery up to the subscription's attempt limit.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a single message.
    async fn handle(&self, message: &InboundMessage) -> Result<(), DomainError>;
}

/// Routes messages to handlers by the subject header.
///
/// A subject with no registered handler is logged and acknowledged, not
/// retried: redelivering a message nobody can process only blocks the
/// partition.
#[derive(Default)]
pub struct SubjectRouter {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl SubjectRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a subject, replacing any previous one.
    #[must_use]
    pub fn with_handler(
        mut self,
        subject: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.handlers.insert(subject.into(), handler);
        self
    }

    /// The subjects this router knows about.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Dispatches a message to the handler registered for its subject.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error so the subscription can retry or park
    /// the message.
    pub async fn dispatch(&self, message: &InboundMessage) -> Result<(), DomainError> {
        match self.handlers.get(&message.subject) {
            Some(handler) => handler.handle(message).await,
            None => {
                tracing::warn!(
                    subject = %message.subject,
                    correlation_id = %message.correlation_id,
                    "no handler registered for subject, acknowledging"
                );
                Ok(())
            }
        }
    }
}
