//! Kafka-compatible message transport for the Payflow services.
//!
//! Outbound: [`KafkaEventPublisher`] publishes domain events with the
//! subject and correlation id in transport headers and the aggregate id as
//! the partition key, so one aggregate's events stay ordered.
//!
//! Inbound: [`Subscription`] drives a consumer-group stream with manual
//! offset commits (at-least-once delivery) and hands each message to a
//! [`SubjectRouter`], which dispatches on the subject header. Handlers must
//! be idempotent; messages that keep failing are parked on a dead-letter
//! topic rather than blocking the partition.

pub mod message;
pub mod publisher;
pub mod router;
pub mod subscription;

pub use message::{CORRELATION_ID_HEADER, InboundMessage, SUBJECT_HEADER};
pub use publisher::KafkaEventPublisher;
pub use router::{MessageHandler, SubjectRouter};
pub use subscription::{Subscription, SubscriptionConfig};
