//! In-process [`LogStore`].
//!
//! Streams capture published messages whose subject matches one of their
//! subject filters. Durable consumers answer pull requests with `$JS.ACK`
//! reply subjects and track unacknowledged deliveries, so the replay protocol
//! runs against it unchanged.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use tracing::{debug, warn};

use common::subject::subject_matches;

use crate::ack::{AckReply, is_ack_subject};
use crate::api::{PullNextRequest, parse_request_next_subject};
use crate::config::ConsumerConfig;
use crate::error::MqError;
use crate::models::{ConsumerState, Delivery, StoredMessage, StreamState, Subscription};
use crate::store::LogStore;

#[derive(Default)]
struct StreamData {
    subjects: Vec<String>,
    messages: BTreeMap<u64, StoredMessage>,
    last_sequence: u64,
    consumers: HashMap<String, ConsumerData>,
}

impl StreamData {
    fn captures(&self, subject: &str) -> bool {
        self.subjects
            .iter()
            .any(|filter| subject_matches(filter, subject))
    }

    fn append(
        &mut self,
        subject: &str,
        headers: HashMap<String, String>,
        data: Vec<u8>,
        time: DateTime<Utc>,
    ) -> u64 {
        self.last_sequence += 1;
        let sequence = self.last_sequence;
        self.messages.insert(
            sequence,
            StoredMessage {
                subject: subject.to_string(),
                sequence,
                headers,
                data,
                time,
            },
        );
        sequence
    }

    fn state(&self) -> StreamState {
        let first_sequence = match self.messages.keys().next() {
            Some(first) => *first,
            None if self.last_sequence > 0 => self.last_sequence + 1,
            None => 0,
        };
        StreamState {
            messages: self.messages.len() as u64,
            first_sequence,
            last_sequence: self.last_sequence,
        }
    }
}

#[derive(Default)]
struct ConsumerData {
    next_sequence: u64,
    delivered: u64,
    ack_pending: BTreeSet<u64>,
    reported: Option<ConsumerState>,
}

struct Subscriber {
    filter: String,
    queue_group: Option<String>,
    sender: UnboundedSender<Delivery>,
}

#[derive(Default)]
struct Inner {
    streams: HashMap<String, StreamData>,
    subscribers: Vec<Subscriber>,
    round_robin: usize,
}

impl Inner {
    fn stream(&self, stream: &str) -> Result<&StreamData, MqError> {
        self.streams
            .get(stream)
            .ok_or_else(|| MqError::StreamNotFound(stream.to_string()))
    }

    fn stream_mut(&mut self, stream: &str) -> Result<&mut StreamData, MqError> {
        self.streams
            .get_mut(stream)
            .ok_or_else(|| MqError::StreamNotFound(stream.to_string()))
    }

    /// Senders that should receive a message on `subject`: every plain
    /// subscriber plus one member per queue group.
    fn route(&mut self, subject: &str) -> Vec<UnboundedSender<Delivery>> {
        self.subscribers.retain(|s| !s.sender.is_closed());

        let mut targets = Vec::new();
        let mut groups: BTreeMap<&str, Vec<&UnboundedSender<Delivery>>> = BTreeMap::new();
        for subscriber in &self.subscribers {
            if !subject_matches(&subscriber.filter, subject) {
                continue;
            }
            match &subscriber.queue_group {
                Some(group) => groups.entry(group.as_str()).or_default().push(&subscriber.sender),
                None => targets.push(subscriber.sender.clone()),
            }
        }
        for members in groups.values() {
            targets.push(members[self.round_robin % members.len()].clone());
        }
        self.round_robin = self.round_robin.wrapping_add(1);
        targets
    }
}

/// A [`LogStore`] held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryLogStore {
    inner: Arc<Mutex<Inner>>,
    delivery_delay: Option<Duration>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every pulled message by `delay` before handing it to the reply subject.
    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = Some(delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a stream capturing the given subject filters. Existing streams keep their messages.
    pub fn add_stream(&self, stream: &str, subjects: &[&str]) {
        let mut inner = self.lock();
        let data = inner.streams.entry(stream.to_string()).or_default();
        for subject in subjects {
            if !data.subjects.iter().any(|s| s == subject) {
                data.subjects.push((*subject).to_string());
            }
        }
    }

    /// Append directly to a stream, bypassing subject routing.
    pub fn append(&self, stream: &str, subject: &str, data: Vec<u8>) -> Result<u64, MqError> {
        self.append_with_headers(stream, subject, HashMap::new(), data, Utc::now())
    }

    pub fn append_with_headers(
        &self,
        stream: &str,
        subject: &str,
        headers: HashMap<String, String>,
        data: Vec<u8>,
        time: DateTime<Utc>,
    ) -> Result<u64, MqError> {
        let mut inner = self.lock();
        Ok(inner.stream_mut(stream)?.append(subject, headers, data, time))
    }

    /// Drop every message below `keep_from`, as retention would.
    pub fn purge(&self, stream: &str, keep_from: u64) -> Result<u64, MqError> {
        let mut inner = self.lock();
        let data = inner.stream_mut(stream)?;
        let kept = data.messages.split_off(&keep_from);
        let purged = data.messages.len() as u64;
        data.messages = kept;
        Ok(purged)
    }

    /// Pin the counters reported for a consumer, creating it if needed.
    pub fn set_consumer_state(&self, stream: &str, durable_name: &str, state: ConsumerState) {
        let mut inner = self.lock();
        let data = inner.streams.entry(stream.to_string()).or_default();
        data.consumers
            .entry(durable_name.to_string())
            .or_default()
            .reported = Some(state);
    }

    pub fn consumer_names(&self, stream: &str) -> Vec<String> {
        let inner = self.lock();
        let mut names: Vec<String> = inner
            .streams
            .get(stream)
            .map(|data| data.consumers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Live subscriptions whose filter is exactly `subject`.
    pub fn subscription_count(&self, subject: &str) -> usize {
        let inner = self.lock();
        inner
            .subscribers
            .iter()
            .filter(|s| s.filter == subject && !s.sender.is_closed())
            .count()
    }

    pub fn messages(&self, stream: &str) -> Vec<StoredMessage> {
        let inner = self.lock();
        inner
            .streams
            .get(stream)
            .map(|data| data.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    fn acknowledge(&self, subject: &str) {
        let ack = match AckReply::parse(subject) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed ack");
                return;
            }
        };
        let mut inner = self.lock();
        if let Some(consumer) = inner
            .streams
            .get_mut(&ack.stream)
            .and_then(|data| data.consumers.get_mut(&ack.consumer))
        {
            consumer.ack_pending.remove(&ack.stream_sequence);
        }
    }

    fn pull(&self, stream: &str, durable_name: &str, reply: &str, payload: &[u8]) -> Result<(), MqError> {
        let request: PullNextRequest = if payload.is_empty() {
            PullNextRequest::default()
        } else {
            serde_json::from_slice(payload)?
        };
        let batch = request.batch.max(1);

        let (deliveries, targets) = {
            let mut inner = self.lock();
            let data = inner.stream_mut(stream)?;
            let picked: Vec<StoredMessage> = {
                let consumer = data.consumers.get(durable_name).ok_or_else(|| {
                    MqError::ConsumerNotFound {
                        stream: stream.to_string(),
                        consumer: durable_name.to_string(),
                    }
                })?;
                data.messages
                    .range(consumer.next_sequence..)
                    .take(batch as usize)
                    .map(|(_, message)| message.clone())
                    .collect()
            };
            let remaining = |sequence: u64| data.messages.range(sequence + 1..).count() as u64;
            let pending_after: Vec<u64> = picked.iter().map(|m| remaining(m.sequence)).collect();

            let consumer = data
                .consumers
                .get_mut(durable_name)
                .ok_or_else(|| MqError::Internal(format!("consumer {durable_name} vanished")))?;
            let mut deliveries = Vec::with_capacity(picked.len());
            for (message, pending) in picked.into_iter().zip(pending_after) {
                consumer.delivered += 1;
                consumer.next_sequence = message.sequence + 1;
                consumer.ack_pending.insert(message.sequence);
                let ack = AckReply {
                    stream: stream.to_string(),
                    consumer: durable_name.to_string(),
                    delivered: 1,
                    stream_sequence: message.sequence,
                    consumer_sequence: consumer.delivered,
                    timestamp: message.time,
                    pending,
                };
                deliveries.push(Delivery {
                    subject: message.subject,
                    reply: Some(ack.subject()),
                    payload: message.data,
                });
            }
            (deliveries, inner.route(reply))
        };

        debug!(stream, durable_name, count = deliveries.len(), "Serving pull request");
        let delay = self.delivery_delay;
        tokio::spawn(async move {
            for delivery in deliveries {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                for target in &targets {
                    let _ = target.unbounded_send(delivery.clone());
                }
            }
        });
        Ok(())
    }

    fn route_message(&self, subject: &str, reply: Option<&str>, payload: Vec<u8>) {
        let targets = {
            let mut inner = self.lock();
            let now = Utc::now();
            for data in inner.streams.values_mut() {
                if data.captures(subject) {
                    data.append(subject, HashMap::new(), payload.clone(), now);
                }
            }
            inner.route(subject)
        };
        let delivery = Delivery {
            subject: subject.to_string(),
            reply: reply.map(str::to_string),
            payload,
        };
        for target in targets {
            let _ = target.unbounded_send(delivery.clone());
        }
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn stream_info(&self, stream: &str) -> Result<StreamState, MqError> {
        Ok(self.lock().stream(stream)?.state())
    }

    async fn add_consumer(&self, stream: &str, config: &ConsumerConfig) -> Result<(), MqError> {
        let mut inner = self.lock();
        let data = inner.stream_mut(stream)?;
        data.consumers.insert(
            config.durable_name.clone(),
            ConsumerData {
                next_sequence: config.start_sequence(),
                ..ConsumerData::default()
            },
        );
        Ok(())
    }

    async fn remove_consumer(&self, stream: &str, durable_name: &str) -> Result<(), MqError> {
        let mut inner = self.lock();
        let data = inner.stream_mut(stream)?;
        data.consumers
            .remove(durable_name)
            .map(|_| ())
            .ok_or_else(|| MqError::ConsumerNotFound {
                stream: stream.to_string(),
                consumer: durable_name.to_string(),
            })
    }

    async fn consumer_info(
        &self,
        stream: &str,
        durable_name: &str,
    ) -> Result<ConsumerState, MqError> {
        let inner = self.lock();
        let data = inner.stream(stream)?;
        let consumer = data
            .consumers
            .get(durable_name)
            .ok_or_else(|| MqError::ConsumerNotFound {
                stream: stream.to_string(),
                consumer: durable_name.to_string(),
            })?;
        if let Some(reported) = consumer.reported {
            return Ok(reported);
        }
        Ok(ConsumerState {
            num_pending: data.messages.range(consumer.next_sequence..).count() as u64,
            num_ack_pending: consumer.ack_pending.len() as u64,
        })
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription, MqError> {
        let (sender, receiver) = unbounded();
        self.lock().subscribers.push(Subscriber {
            filter: subject.to_string(),
            queue_group: queue_group.map(str::to_string),
            sender,
        });
        Ok(receiver.boxed())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), MqError> {
        if is_ack_subject(subject) {
            self.acknowledge(subject);
        } else if parse_request_next_subject(subject).is_none() {
            self.route_message(subject, None, payload);
        }
        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<(), MqError> {
        match parse_request_next_subject(subject) {
            Some((stream, durable_name)) => self.pull(stream, durable_name, reply, &payload),
            None => {
                self.route_message(subject, Some(reply), payload);
                Ok(())
            }
        }
    }

    async fn get_message(&self, stream: &str, sequence: u64) -> Result<StoredMessage, MqError> {
        let inner = self.lock();
        inner
            .stream(stream)?
            .messages
            .get(&sequence)
            .cloned()
            .ok_or_else(|| MqError::MessageNotFound {
                stream: stream.to_string(),
                seq: sequence,
            })
    }

    async fn read_by_filter(
        &self,
        stream: &str,
        filter: &str,
        start_sequence: u64,
        max_count: u64,
        _deadline: Duration,
    ) -> Result<Vec<StoredMessage>, MqError> {
        let inner = self.lock();
        Ok(inner
            .stream(stream)?
            .messages
            .range(start_sequence.max(1)..)
            .map(|(_, message)| message)
            .filter(|message| subject_matches(filter, &message.subject))
            .take(max_count as usize)
            .cloned()
            .collect())
    }

    async fn delete_message(&self, stream: &str, sequence: u64) -> Result<bool, MqError> {
        let mut inner = self.lock();
        Ok(inner.stream_mut(stream)?.messages.remove(&sequence).is_some())
    }
}
