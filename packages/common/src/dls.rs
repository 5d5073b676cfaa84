use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Producer attributes captured when a record is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub client_address: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub created_by_user: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Consumer group poisoned by a message.
///
/// The live counters are only filled in on detail queries; records keep
/// them at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoisonedCg {
    pub cg_name: String,
    pub poisoning_time: DateTime<Utc>,
    pub deliveries_count: u64,
    #[serde(default)]
    pub unprocessed_messages: u64,
    #[serde(default)]
    pub in_process_messages: u64,
    #[serde(default)]
    pub total_poison_messages: u64,
}

impl PoisonedCg {
    pub fn new(cg_name: impl Into<String>, deliveries_count: u64) -> Self {
        Self {
            cg_name: cg_name.into(),
            poisoning_time: Utc::now(),
            deliveries_count,
            unprocessed_messages: 0,
            in_process_messages: 0,
            total_poison_messages: 0,
        }
    }
}

/// The original message as stored in a dead-letter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayloadDls {
    pub time_sent: DateTime<Utc>,
    /// Subject + data + headers length of the original message.
    pub size: usize,
    /// Hex-encoded raw data.
    pub data: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl MessagePayloadDls {
    pub fn headers_len(&self) -> usize {
        self.headers.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// Durable unit written to a station's dead-letter stream.
///
/// Records are immutable. The same `id` appears once per poisoned consumer
/// group, each under its own subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub station_name: String,
    pub message_seq: u64,
    #[serde(default)]
    pub producer: ProducerDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poisoned_cg: Option<PoisonedCg>,
    pub message: MessagePayloadDls,
    #[serde(default)]
    pub creation_unix: i64,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
}

impl DeadLetterRecord {
    /// When the record was created, preferring `creation_date` and falling
    /// back to `creation_unix` seconds.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_date.or_else(|| {
            (self.creation_unix > 0)
                .then(|| DateTime::from_timestamp(self.creation_unix, 0))
                .flatten()
        })
    }
}

/// Summary entry of a station listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightDlsMessage {
    pub message_seq: u64,
    pub id: String,
    pub message: MessagePayloadDls,
}

/// Both listing partitions of a station.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StationDlsMessages {
    pub poison_messages: Vec<LightDlsMessage>,
    pub schema_messages: Vec<LightDlsMessage>,
    /// Deduplicated count across both partitions before capping.
    pub total_dls_amount: usize,
}

/// Detail view of one dead-lettered message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DlsMessageResponse {
    pub id: String,
    pub station_name: String,
    pub message_seq: u64,
    pub producer: ProducerDetails,
    pub message: Option<MessagePayloadDls>,
    pub creation_date: Option<DateTime<Utc>>,
    pub poisoned_cgs: Vec<PoisonedCg>,
}

/// Identifying attributes of an original station message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetails {
    pub message_seq: u64,
    /// Producer name; empty for non-native producers.
    pub produced_by: String,
    pub time_sent: DateTime<Utc>,
}
