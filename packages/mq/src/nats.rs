use std::collections::HashMap;
use std::time::Duration;

use async_nats::HeaderMap;
use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::consumer::pull::Config as PullConfig;
use async_nats::jetstream::context::GetStreamErrorKind;
use async_nats::jetstream::message::StreamMessage;
use async_nats::jetstream::stream::{
    ConsumerError, ConsumerErrorKind, DeleteMessageErrorKind, LastRawMessageErrorKind, Stream,
};
use async_nats::jetstream::{self, ErrorCode, consumer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use common::MqAppConfig;

use crate::config::ConsumerConfig;
use crate::error::MqError;
use crate::models::{ConsumerState, Delivery, StoredMessage, StreamState, Subscription};
use crate::store::LogStore;

/// Prefix of the short-lived consumers behind filtered reads.
const FILTER_CONSUMER_PREFIX: &str = "$memphis_dls_filter_";

/// Server-side cleanup delay of a filtered-read consumer left behind.
const FILTER_CONSUMER_INACTIVITY: Duration = Duration::from_secs(30);

/// [`LogStore`] backed by a NATS JetStream server.
///
/// Stream and consumer management go through the JetStream context. The
/// replay pull protocol (`$JS.API.CONSUMER.MSG.NEXT` and `$JS.ACK`) is spoken
/// over the core client.
#[derive(Clone)]
pub struct NatsLogStore {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    request_timeout: Duration,
}

impl NatsLogStore {
    pub fn new(client: async_nats::Client, request_timeout: Duration) -> Self {
        let mut jetstream = jetstream::new(client.clone());
        jetstream.set_timeout(request_timeout);
        Self {
            client,
            jetstream,
            request_timeout,
        }
    }

    /// Handle for per-message and consumer calls; costs no round trip.
    async fn stream(&self, stream: &str) -> Result<Stream<()>, MqError> {
        self.jetstream
            .get_stream_no_info(stream)
            .await
            .map_err(|e| MqError::Internal(format!("invalid stream {stream}: {e}")))
    }

    fn consumer_error(&self, err: ConsumerError, stream: &str, consumer: &str) -> MqError {
        match err.kind() {
            ConsumerErrorKind::JetStream(err) => api_error(err, stream, Some(consumer), None),
            ConsumerErrorKind::TimedOut => MqError::Timeout {
                subject: format!("{stream}.{consumer}"),
                timeout: self.request_timeout,
            },
            _ => MqError::Internal(format!("consumer {consumer} on {stream}: {err}")),
        }
    }

    async fn fetch_filtered(
        &self,
        consumer: &PullConsumer,
        max_count: u64,
        until: Instant,
    ) -> Result<Vec<StoredMessage>, MqError> {
        let expires = until.saturating_duration_since(Instant::now());
        let mut batch = consumer
            .fetch()
            .max_messages(usize::try_from(max_count).unwrap_or(usize::MAX))
            .expires(expires)
            .messages()
            .await
            .map_err(|e| MqError::Subscribe(format!("filtered read: {e}")))?;

        let mut messages = Vec::new();
        loop {
            match timeout_at(until, batch.next()).await {
                Ok(Some(Ok(message))) => messages.push(delivered_message(message)?),
                Ok(Some(Err(e))) => {
                    return Err(MqError::Internal(format!("filtered read failed: {e}")));
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(read = messages.len(), "Filtered read hit its deadline");
                    break;
                }
            }
        }
        Ok(messages)
    }
}

/// Map a JetStream API error, giving not-found codes their own variants.
fn api_error(
    err: jetstream::Error,
    stream: &str,
    consumer: Option<&str>,
    seq: Option<u64>,
) -> MqError {
    match err.error_code() {
        ErrorCode::STREAM_NOT_FOUND => MqError::StreamNotFound(stream.to_string()),
        ErrorCode::CONSUMER_NOT_FOUND => MqError::ConsumerNotFound {
            stream: stream.to_string(),
            consumer: consumer.unwrap_or_default().to_string(),
        },
        ErrorCode::NO_MESSAGE_FOUND | ErrorCode::SEQUENCE_NOT_FOUND => MqError::MessageNotFound {
            stream: stream.to_string(),
            seq: seq.unwrap_or_default(),
        },
        _ => MqError::Api(err.to_string()),
    }
}

/// First value of each header.
fn header_values(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, values)| {
            values
                .first()
                .map(|value| (name.to_string(), value.as_str().to_string()))
        })
        .collect()
}

fn utc(seconds: i64, nanos: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, nanos).unwrap_or_default()
}

fn stored_message(message: StreamMessage) -> StoredMessage {
    StoredMessage {
        subject: message.subject.to_string(),
        sequence: message.sequence,
        headers: header_values(&message.headers),
        data: message.payload.to_vec(),
        time: utc(message.time.unix_timestamp(), message.time.nanosecond()),
    }
}

fn delivered_message(message: jetstream::Message) -> Result<StoredMessage, MqError> {
    let (sequence, time) = {
        let info = message
            .info()
            .map_err(|e| MqError::InvalidAckReply(e.to_string()))?;
        (
            info.stream_sequence,
            utc(info.published.unix_timestamp(), info.published.nanosecond()),
        )
    };
    Ok(StoredMessage {
        subject: message.subject.to_string(),
        sequence,
        headers: message
            .headers
            .as_ref()
            .map(header_values)
            .unwrap_or_default(),
        data: message.payload.to_vec(),
        time,
    })
}

#[async_trait]
impl LogStore for NatsLogStore {
    async fn stream_info(&self, stream: &str) -> Result<StreamState, MqError> {
        let handle = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| match e.kind() {
                GetStreamErrorKind::JetStream(err) => api_error(err, stream, None, None),
                _ => MqError::Internal(format!("stream info for {stream}: {e}")),
            })?;
        let state = &handle.cached_info().state;
        Ok(StreamState {
            messages: state.messages,
            first_sequence: state.first_sequence,
            last_sequence: state.last_sequence,
        })
    }

    #[instrument(skip(self, config), fields(durable = %config.durable_name))]
    async fn add_consumer(&self, stream: &str, config: &ConsumerConfig) -> Result<(), MqError> {
        self.stream(stream)
            .await?
            .create_consumer(PullConfig::from(config))
            .await
            .map_err(|e| self.consumer_error(e, stream, &config.durable_name))?;
        debug!("Consumer created");
        Ok(())
    }

    async fn remove_consumer(&self, stream: &str, durable_name: &str) -> Result<(), MqError> {
        self.jetstream
            .delete_consumer_from_stream(durable_name, stream)
            .await
            .map_err(|e| self.consumer_error(e, stream, durable_name))?;
        Ok(())
    }

    async fn consumer_info(
        &self,
        stream: &str,
        durable_name: &str,
    ) -> Result<ConsumerState, MqError> {
        let consumer: PullConsumer = self
            .jetstream
            .get_consumer_from_stream(durable_name, stream)
            .await
            .map_err(|e| self.consumer_error(e, stream, durable_name))?;
        let info = consumer.cached_info();
        Ok(ConsumerState {
            num_pending: info.num_pending,
            num_ack_pending: info.num_ack_pending as u64,
        })
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription, MqError> {
        let subscriber = match queue_group {
            Some(group) => {
                self.client
                    .queue_subscribe(subject.to_string(), group.to_string())
                    .await
            }
            None => self.client.subscribe(subject.to_string()).await,
        }
        .map_err(|e| MqError::Subscribe(format!("{subject}: {e}")))?;

        Ok(subscriber
            .map(|message| Delivery {
                subject: message.subject.to_string(),
                reply: message.reply.map(|reply| reply.to_string()),
                payload: message.payload.to_vec(),
            })
            .boxed())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), MqError> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| MqError::Publish(format!("{subject}: {e}")))
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<(), MqError> {
        self.client
            .publish_with_reply(subject.to_string(), reply.to_string(), payload.into())
            .await
            .map_err(|e| MqError::Publish(format!("{subject}: {e}")))
    }

    async fn get_message(&self, stream: &str, sequence: u64) -> Result<StoredMessage, MqError> {
        let message = self
            .stream(stream)
            .await?
            .get_raw_message(sequence)
            .await
            .map_err(|e| match e.kind() {
                LastRawMessageErrorKind::NoMessageFound => MqError::MessageNotFound {
                    stream: stream.to_string(),
                    seq: sequence,
                },
                LastRawMessageErrorKind::JetStream(err) => {
                    api_error(err, stream, None, Some(sequence))
                }
                LastRawMessageErrorKind::Other => {
                    MqError::Internal(format!("message {sequence} of {stream}: {e}"))
                }
            })?;
        Ok(stored_message(message))
    }

    /// Reads through a short-lived filtered pull consumer, removed once the
    /// read is over.
    #[instrument(skip(self))]
    async fn read_by_filter(
        &self,
        stream: &str,
        filter: &str,
        start_sequence: u64,
        max_count: u64,
        deadline: Duration,
    ) -> Result<Vec<StoredMessage>, MqError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let until = Instant::now() + deadline;
        let name = format!("{FILTER_CONSUMER_PREFIX}{}", Uuid::new_v4().simple());
        let handle = self.stream(stream).await?;
        let consumer: PullConsumer = handle
            .create_consumer(PullConfig {
                name: Some(name.clone()),
                filter_subject: filter.to_string(),
                deliver_policy: consumer::DeliverPolicy::ByStartSequence {
                    start_sequence: start_sequence.max(1),
                },
                ack_policy: consumer::AckPolicy::None,
                inactive_threshold: FILTER_CONSUMER_INACTIVITY,
                ..Default::default()
            })
            .await
            .map_err(|e| self.consumer_error(e, stream, &name))?;

        let read = self.fetch_filtered(&consumer, max_count, until).await;

        if let Err(e) = handle.delete_consumer(&name).await {
            warn!(consumer = %name, error = %e, "Failed to remove filtered-read consumer");
        }
        read
    }

    async fn delete_message(&self, stream: &str, sequence: u64) -> Result<bool, MqError> {
        let deleted = self
            .stream(stream)
            .await?
            .delete_message(sequence)
            .await
            .map_err(|e| match e.kind() {
                DeleteMessageErrorKind::JetStream(err) => {
                    api_error(err, stream, None, Some(sequence))
                }
                DeleteMessageErrorKind::TimedOut => MqError::Timeout {
                    subject: format!("{stream}.{sequence}"),
                    timeout: self.request_timeout,
                },
                DeleteMessageErrorKind::Request => {
                    MqError::Internal(format!("delete of {sequence} in {stream}: {e}"))
                }
            });
        match deleted {
            Ok(success) => Ok(success),
            Err(MqError::MessageNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Connect to the broker described by `config`.
pub async fn init_mq(config: &MqAppConfig) -> Result<NatsLogStore, MqError> {
    let client = async_nats::ConnectOptions::new()
        .name(config.connection_name.as_str())
        .connect(config.url.as_str())
        .await
        .map_err(|e| MqError::Connection(format!("{}: {e}", config.url)))?;
    Ok(NatsLogStore::new(client, config.request_timeout()))
}
