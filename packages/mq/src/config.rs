use async_nats::jetstream::consumer;
use serde::{Deserialize, Serialize};

/// Where a new consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverPolicy {
    All,
    #[serde(rename = "by_start_sequence")]
    FromStartSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    None,
    All,
    Explicit,
}

/// Durable consumer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub durable_name: String,
    pub deliver_policy: DeliverPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_start_seq: Option<u64>,
    pub ack_policy: AckPolicy,
}

impl ConsumerConfig {
    /// Explicit-ack pull consumer positioned at `start_sequence`.
    pub fn from_start_sequence(durable_name: impl Into<String>, start_sequence: u64) -> Self {
        Self {
            durable_name: durable_name.into(),
            deliver_policy: DeliverPolicy::FromStartSequence,
            opt_start_seq: Some(start_sequence),
            ack_policy: AckPolicy::Explicit,
        }
    }

    /// First stream sequence this consumer delivers.
    pub fn start_sequence(&self) -> u64 {
        match self.deliver_policy {
            DeliverPolicy::All => 1,
            DeliverPolicy::FromStartSequence => self.opt_start_seq.unwrap_or(1).max(1),
        }
    }
}

impl From<&ConsumerConfig> for consumer::pull::Config {
    fn from(config: &ConsumerConfig) -> Self {
        let deliver_policy = match config.deliver_policy {
            DeliverPolicy::All => consumer::DeliverPolicy::All,
            DeliverPolicy::FromStartSequence => consumer::DeliverPolicy::ByStartSequence {
                start_sequence: config.start_sequence(),
            },
        };
        let ack_policy = match config.ack_policy {
            AckPolicy::None => consumer::AckPolicy::None,
            AckPolicy::All => consumer::AckPolicy::All,
            AckPolicy::Explicit => consumer::AckPolicy::Explicit,
        };
        consumer::pull::Config {
            durable_name: Some(config.durable_name.clone()),
            deliver_policy,
            ack_policy,
            ..Default::default()
        }
    }
}
