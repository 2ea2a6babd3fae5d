//! Consumer-group subscription loop with manual offset tracking.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::{Semaphore, watch};
use uuid::Uuid;

use payflow_core::error::DomainError;

use crate::message::{CORRELATION_ID_HEADER, InboundMessage, SUBJECT_HEADER};
use crate::router::SubjectRouter;

/// Configuration for one consumer-group subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Comma-separated broker addresses.
    pub brokers: String,
    /// Topic to subscribe to.
    pub topic: String,
    /// Consumer group id; instances sharing it split the partitions.
    pub group_id: String,
    /// Maximum handler invocations in flight at once.
    pub max_concurrent: usize,
    /// Handling attempts per message before it is parked on the dead-letter
    /// topic.
    pub max_attempts: u32,
    /// Topic where undeliverable messages are parked.
    pub dead_letter_topic: String,
}

/// Tracks which offsets have finished handling and computes, per partition,
/// the highest offset below which everything is done.
///
/// Handlers run concurrently, so offsets complete out of order; only the
/// contiguous prefix may be stored for commit, otherwise a crash would skip
/// an unfinished message.
#[derive(Debug, Default)]
struct OffsetTracker {
    partitions: HashMap<i32, BTreeMap<i64, bool>>,
}

impl OffsetTracker {
    fn start(&mut self, partition: i32, offset: i64) {
        self.partitions.entry(partition).or_default().insert(offset, false);
    }

    /// Marks an offset as handled. Returns the new highest contiguous
    /// handled offset for the partition, if the prefix advanced.
    fn complete(&mut self, partition: i32, offset: i64) -> Option<i64> {
        let pending = self.partitions.get_mut(&partition)?;
        pending.insert(offset, true);

        let mut advanced = None;
        while let Some((&head, &done)) = pending.iter().next() {
            if !done {
                break;
            }
            pending.remove(&head);
            advanced = Some(head);
        }
        advanced
    }
}

/// A running consumer-group subscription.
///
/// Delivery is at-least-once: offsets are stored for commit only once every
/// earlier message of the partition has been handled or parked, so a crash
/// redelivers anything still in flight and handlers must be idempotent.
/// Handler invocations run concurrently up to `max_concurrent`; the broker's
/// partitioning by aggregate id keeps one aggregate's messages ordered.
pub struct Subscription {
    config: SubscriptionConfig,
    router: Arc<SubjectRouter>,
}

impl Subscription {
    /// Pairs a configuration with the router that will handle its messages.
    #[must_use]
    pub fn new(config: SubscriptionConfig, router: SubjectRouter) -> Self {
        Self {
            config,
            router: Arc::new(router),
        }
    }

    /// Runs the consume loop until `shutdown` flips to `true`, then drains
    /// the handlers still in flight.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Transport`] when the consumer or dead-letter
    /// producer cannot be created or the topic subscription fails. Errors on
    /// individual messages are handled inside the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        let consumer: Arc<StreamConsumer> = Arc::new(
            ClientConfig::new()
                .set("bootstrap.servers", &self.config.brokers)
                .set("group.id", &self.config.group_id)
                .set("enable.auto.commit", "true")
                .set("enable.auto.offset.store", "false")
                .set("auto.offset.reset", "earliest")
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| DomainError::Transport(format!("failed to create consumer: {e}")))?,
        );

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| {
                DomainError::Transport(format!(
                    "failed to subscribe to {}: {e}",
                    self.config.topic
                ))
            })?;

        let dead_letters: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| {
                DomainError::Transport(format!("failed to create dead-letter producer: {e}"))
            })?;

        tracing::info!(
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            max_concurrent = self.config.max_concurrent,
            "subscription started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let tracker = Arc::new(Mutex::new(OffsetTracker::default()));
        let worker = Arc::new(MessageWorker {
            router: Arc::clone(&self.router),
            dead_letters,
            dead_letter_topic: self.config.dead_letter_topic.clone(),
            max_attempts: self.config.max_attempts,
        });

        let mut stream = consumer.stream();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            let permit = Arc::clone(&semaphore)
                                .acquire_owned()
                                .await
                                .map_err(|e| DomainError::Infrastructure(e.to_string()))?;
                            let message = message.detach();
                            let partition = message.partition();
                            let offset = message.offset();
                            if let Ok(mut t) = tracker.lock() {
                                t.start(partition, offset);
                            }

                            let worker = Arc::clone(&worker);
                            let tracker = Arc::clone(&tracker);
                            let consumer = Arc::clone(&consumer);
                            let topic = self.config.topic.clone();
                            tokio::spawn(async move {
                                worker.process(&message).await;
                                let committable = tracker
                                    .lock()
                                    .ok()
                                    .and_then(|mut t| t.complete(partition, offset));
                                if let Some(done_up_to) = committable {
                                    if let Err(e) =
                                        consumer.store_offset(&topic, partition, done_up_to)
                                    {
                                        tracing::warn!(
                                            topic = %topic,
                                            partition,
                                            offset = done_up_to,
                                            error = %e,
                                            "failed to store offset, messages may be redelivered"
                                        );
                                    }
                                }
                                drop(permit);
                            });
                        }
                        Some(Err(e)) => {
                            tracing::error!(
                                topic = %self.config.topic,
                                error = %e,
                                "error receiving message"
                            );
                        }
                        None => {
                            tracing::info!(topic = %self.config.topic, "message stream ended");
                            break;
                        }
                    }
                }
            }
        }

        drop(stream);
        // Wait for in-flight handlers before dropping the consumer so their
        // offsets still get stored.
        let _drain = semaphore
            .acquire_many(u32::try_from(self.config.max_concurrent).unwrap_or(u32::MAX))
            .await;
        tracing::info!(topic = %self.config.topic, "subscription stopped");
        Ok(())
    }
}

/// Per-message handling shared by the spawned tasks.
struct MessageWorker {
    router: Arc<SubjectRouter>,
    dead_letters: FutureProducer,
    dead_letter_topic: String,
    max_attempts: u32,
}

impl MessageWorker {
    /// Handles one delivery: decode, dispatch with bounded attempts, park on
    /// the dead-letter topic when the attempts are exhausted. Always leaves
    /// the message acknowledgeable.
    async fn process(&self, message: &OwnedMessage) {
        let inbound = match decode_message(message) {
            Ok(inbound) => inbound,
            Err(reason) => {
                tracing::warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    %reason,
                    "undecodable message, parking on dead-letter topic"
                );
                self.park(message, &reason).await;
                return;
            }
        };

        let mut attempt = 1;
        loop {
            match self.router.dispatch(&inbound).await {
                Ok(()) => return,
                Err(err) if attempt < self.max_attempts => {
                    tracing::warn!(
                        subject = %inbound.subject,
                        correlation_id = %inbound.correlation_id,
                        attempt,
                        error = %err,
                        "handler failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err(err) => {
                    tracing::error!(
                        subject = %inbound.subject,
                        correlation_id = %inbound.correlation_id,
                        attempts = attempt,
                        error = %err,
                        "handler attempts exhausted, parking on dead-letter topic"
                    );
                    self.park(message, &err.to_string()).await;
                    return;
                }
            }
        }
    }

    /// Copies the raw message onto the dead-letter topic with its original
    /// headers plus the failure reason.
    async fn park(&self, message: &OwnedMessage, reason: &str) {
        let mut headers = message
            .headers()
            .map_or_else(OwnedHeaders::new, Clone::clone);
        headers = headers.insert(Header {
            key: "x-dead-letter-reason",
            value: Some(reason),
        });

        let payload = message.payload().unwrap_or_default();
        let key = message.key().unwrap_or_default();
        let record = FutureRecord::to(&self.dead_letter_topic)
            .payload(payload)
            .key(key)
            .headers(headers);

        if let Err((e, _)) = self
            .dead_letters
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            // The offset still advances; at this point the message is lost
            // to the dead-letter topic but logged with full context.
            tracing::error!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "failed to park message on dead-letter topic"
            );
        }
    }
}

/// Decodes a raw delivery into an [`InboundMessage`].
fn decode_message(message: &OwnedMessage) -> Result<InboundMessage, String> {
    let mut subject = None;
    let mut correlation_id = None;
    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            match header.key {
                SUBJECT_HEADER => {
                    subject = header
                        .value
                        .and_then(|v| std::str::from_utf8(v).ok())
                        .map(str::to_owned);
                }
                CORRELATION_ID_HEADER => {
                    correlation_id = header
                        .value
                        .and_then(|v| std::str::from_utf8(v).ok())
                        .and_then(|v| Uuid::parse_str(v).ok());
                }
                _ => {}
            }
        }
    }

    let subject = subject.ok_or_else(|| "missing subject header".to_owned())?;
    let payload = message.payload().ok_or_else(|| "empty payload".to_owned())?;
    let body: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| format!("malformed JSON body: {e}"))?;

    Ok(InboundMessage {
        subject,
        body,
        correlation_id: correlation_id.unwrap_or_else(Uuid::new_v4),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_tracker_advances_in_order() {
        let mut tracker = OffsetTracker::default();
        tracker.start(0, 5);
        tracker.start(0, 6);

        assert_eq!(tracker.complete(0, 5), Some(5));
        assert_eq!(tracker.complete(0, 6), Some(6));
    }

    #[test]
    fn test_offset_tracker_holds_back_gaps() {
        let mut tracker = OffsetTracker::default();
        tracker.start(0, 5);
        tracker.start(0, 6);
        tracker.start(0, 7);

        // 6 and 7 finish before 5; nothing may be stored yet.
        assert_eq!(tracker.complete(0, 6), None);
        assert_eq!(tracker.complete(0, 7), None);
        // Once 5 completes the whole prefix unblocks.
        assert_eq!(tracker.complete(0, 5), Some(7));
    }

    #[test]
    fn test_offset_tracker_partitions_are_independent() {
        let mut tracker = OffsetTracker::default();
        tracker.start(0, 1);
        tracker.start(1, 9);

        assert_eq!(tracker.complete(1, 9), Some(9));
        assert_eq!(tracker.complete(0, 1), Some(1));
    }

    #[test]
    fn test_offset_tracker_unknown_partition_is_ignored() {
        let mut tracker = OffsetTracker::default();

        assert_eq!(tracker.complete(3, 42), None);
    }
}
