use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// Message counters of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamState {
    pub messages: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

impl StreamState {
    /// Sequence a full read should start at; an unset first sequence means 1.
    pub fn start_sequence(&self) -> u64 {
        if self.first_sequence > 0 {
            self.first_sequence
        } else {
            1
        }
    }
}

/// Delivery counters of a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerState {
    /// Messages not yet delivered.
    pub num_pending: u64,
    /// Messages delivered but not acknowledged.
    pub num_ack_pending: u64,
}

/// A message as persisted in a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub subject: String,
    pub sequence: u64,
    /// First value of each header; empty when the message has none.
    pub headers: HashMap<String, String>,
    pub data: Vec<u8>,
    pub time: DateTime<Utc>,
}

impl StoredMessage {
    /// Subject + data + header keys and values length.
    pub fn size(&self) -> usize {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        self.subject.len() + self.data.len() + headers
    }
}

/// A message received on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Vec<u8>,
}

/// Inbound messages of one subscription. Dropping it unsubscribes.
pub type Subscription = BoxStream<'static, Delivery>;
