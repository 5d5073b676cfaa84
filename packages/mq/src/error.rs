use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Consumer not found: {stream}/{consumer}")]
    ConsumerNotFound { stream: String, consumer: String },

    #[error("Message {seq} not found in stream {stream}")]
    MessageNotFound { stream: String, seq: u64 },

    #[error("Request to {subject} timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    #[error("Log store API error: {0}")]
    Api(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid ack reply subject: {0}")]
    InvalidAckReply(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("{0}")]
    Internal(String),
}

impl MqError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StreamNotFound(_) | Self::ConsumerNotFound { .. } | Self::MessageNotFound { .. }
        )
    }
}
