use serde::Deserialize;

use crate::error::DlsError;

/// Broker advisory published when a consumer exhausts its deliveries of a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaxDeliveriesAdvisory {
    /// Internal name of the station's stream.
    pub stream: String,
    /// Internal name of the consumer group.
    pub consumer: String,
    pub stream_seq: u64,
    pub deliveries: u64,
}

impl MaxDeliveriesAdvisory {
    pub fn decode(payload: &[u8]) -> Result<Self, DlsError> {
        serde_json::from_slice(payload).map_err(|e| DlsError::MalformedAdvisory(e.to_string()))
    }
}
