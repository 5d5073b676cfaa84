use std::time::Duration;

use async_trait::async_trait;

use crate::config::ConsumerConfig;
use crate::error::MqError;
use crate::models::{ConsumerState, StoredMessage, StreamState, Subscription};

/// Client of an append-only, sequence-numbered, per-stream message log.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Current counters of a stream.
    async fn stream_info(&self, stream: &str) -> Result<StreamState, MqError>;

    /// Create a durable pull consumer.
    async fn add_consumer(&self, stream: &str, config: &ConsumerConfig) -> Result<(), MqError>;

    async fn remove_consumer(&self, stream: &str, durable_name: &str) -> Result<(), MqError>;

    async fn consumer_info(
        &self,
        stream: &str,
        durable_name: &str,
    ) -> Result<ConsumerState, MqError>;

    /// Subscribe to a subject, optionally as a member of a queue group.
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription, MqError>;

    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), MqError>;

    /// Fire-and-forget publish; responses go to `reply`.
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<(), MqError>;

    /// Load one message by sequence.
    async fn get_message(&self, stream: &str, sequence: u64) -> Result<StoredMessage, MqError>;

    /// Read up to `max_count` messages matching `filter`, starting at
    /// `start_sequence`, in one bounded round trip. Whatever was read when
    /// `deadline` elapses is returned.
    async fn read_by_filter(
        &self,
        stream: &str,
        filter: &str,
        start_sequence: u64,
        max_count: u64,
        deadline: Duration,
    ) -> Result<Vec<StoredMessage>, MqError>;

    /// Delete one message. Returns `false` if it was already gone.
    async fn delete_message(&self, stream: &str, sequence: u64) -> Result<bool, MqError>;
}
