//! Read a stream back through a short-lived pull consumer.
//!
//! A full scan creates a uniquely named durable consumer at the stream's
//! first sequence, asks it for every message in one pull request and drains
//! the replies until all arrived or the deadline fired. The consumer is
//! removed afterwards in every case.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::ack::AckReply;
use crate::api::{PullNextRequest, request_next_subject};
use crate::config::ConsumerConfig;
use crate::error::MqError;
use crate::models::{StreamState, Subscription};
use crate::store::LogStore;

/// Durable name prefix of replay consumers.
pub const REPLAY_CONSUMER_PREFIX: &str = "$memphis_fetch_dls_consumer_";

/// A message read back during one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedMessage {
    pub subject: String,
    pub sequence: u64,
    pub data: Vec<u8>,
    pub time: DateTime<Utc>,
}

/// Result of a filtered scan together with the stream view it was taken from.
#[derive(Debug, Clone, Default)]
pub struct FilteredScan {
    pub state: StreamState,
    pub start_sequence: u64,
    pub messages: Vec<ReplayedMessage>,
}

/// Aborts the reply relay when the scan ends, closing its channel and
/// dropping the reply subscription.
struct RelayGuard(JoinHandle<()>);

impl Drop for RelayGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct ReplayEngine {
    store: Arc<dyn LogStore>,
    channel_capacity: usize,
}

impl ReplayEngine {
    pub fn new(store: Arc<dyn LogStore>, channel_capacity: usize) -> Self {
        Self {
            store,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Read every message of `stream` that arrives before `deadline`.
    ///
    /// Running out of time is not an error: whatever was collected is
    /// returned. A failure to remove the replay consumer is.
    pub async fn scan(
        &self,
        stream: &str,
        deadline: Duration,
    ) -> Result<Vec<ReplayedMessage>, MqError> {
        let state = self.store.stream_info(stream).await?;
        if state.messages == 0 {
            return Ok(Vec::new());
        }

        let durable_name = format!("{REPLAY_CONSUMER_PREFIX}{}", Uuid::new_v4().simple());
        let reply_subject = format!("{durable_name}_reply");
        let config = ConsumerConfig::from_start_sequence(&durable_name, state.start_sequence());
        self.store.add_consumer(stream, &config).await?;

        let collected = self
            .collect(stream, &durable_name, &reply_subject, state.messages, deadline)
            .await;

        if let Err(e) = self.store.remove_consumer(stream, &durable_name).await {
            error!(stream, durable_name = %durable_name, error = %e, "Failed to remove replay consumer");
            return Err(e);
        }

        let messages = collected?;
        debug!(
            stream,
            expected = state.messages,
            received = messages.len(),
            "Scan finished"
        );
        Ok(messages)
    }

    async fn collect(
        &self,
        stream: &str,
        durable_name: &str,
        reply_subject: &str,
        amount: u64,
        deadline: Duration,
    ) -> Result<Vec<ReplayedMessage>, MqError> {
        let subscription = self.store.subscribe(reply_subject, None).await?;
        let (tx, mut rx) = mpsc::channel(self.channel_capacity);
        let _relay = RelayGuard(tokio::spawn(relay(self.store.clone(), subscription, tx)));

        let request = PullNextRequest {
            batch: amount,
            expires: u64::try_from(deadline.as_nanos()).ok(),
        };
        self.store
            .publish_with_reply(
                &request_next_subject(stream, durable_name),
                reply_subject,
                serde_json::to_vec(&request)?,
            )
            .await?;

        let timer = tokio::time::sleep(deadline);
        tokio::pin!(timer);

        let mut messages = Vec::with_capacity(amount.min(self.channel_capacity as u64) as usize);
        while (messages.len() as u64) < amount {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(message) => messages.push(message),
                    None => break,
                },
                _ = &mut timer => {
                    debug!(stream, received = messages.len(), amount, "Scan deadline reached");
                    break;
                }
            }
        }

        Ok(messages)
    }

    /// Read the messages of `stream` whose subject matches `filter` in one
    /// bounded request, starting at `start_sequence` or at the stream's first
    /// sequence when none is given.
    pub async fn scan_filtered(
        &self,
        stream: &str,
        filter: &str,
        start_sequence: Option<u64>,
        deadline: Duration,
    ) -> Result<FilteredScan, MqError> {
        let state = self.store.stream_info(stream).await?;
        let start_sequence = start_sequence.unwrap_or_else(|| state.start_sequence());
        if state.messages == 0 {
            return Ok(FilteredScan {
                state,
                start_sequence,
                messages: Vec::new(),
            });
        }

        let messages = self
            .store
            .read_by_filter(stream, filter, start_sequence, state.messages, deadline)
            .await?
            .into_iter()
            .map(|message| ReplayedMessage {
                subject: message.subject,
                sequence: message.sequence,
                data: message.data,
                time: message.time,
            })
            .collect();

        Ok(FilteredScan {
            state,
            start_sequence,
            messages,
        })
    }
}

/// Acknowledge each reply and forward it to the scan.
async fn relay(
    store: Arc<dyn LogStore>,
    mut subscription: Subscription,
    tx: mpsc::Sender<ReplayedMessage>,
) {
    while let Some(delivery) = subscription.next().await {
        let Some(reply) = delivery.reply else {
            warn!(subject = %delivery.subject, "Replay delivery without ack subject");
            continue;
        };
        if let Err(e) = store.publish(&reply, Vec::new()).await {
            warn!(error = %e, "Failed to ack replayed message");
        }
        let ack = match AckReply::parse(&reply) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "Skipping replayed message");
                continue;
            }
        };
        let message = ReplayedMessage {
            subject: delivery.subject,
            sequence: ack.stream_sequence,
            data: delivery.payload,
            time: ack.timestamp,
        };
        if tx.send(message).await.is_err() {
            break;
        }
    }
}
