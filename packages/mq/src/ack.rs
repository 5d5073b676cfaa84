use chrono::{DateTime, Utc};

use crate::error::MqError;

const ACK_PREFIX: &str = "$JS.ACK";

/// Delivery metadata carried by the reply subject of a pulled message.
///
/// Two layouts exist:
/// `$JS.ACK.<stream>.<consumer>.<delivered>.<stream seq>.<consumer seq>.<ts>.<pending>`
/// and the domain-aware
/// `$JS.ACK.<domain>.<account>.<stream>.<consumer>.<delivered>.<stream seq>.<consumer seq>.<ts>.<pending>[.<token>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckReply {
    pub stream: String,
    pub consumer: String,
    pub delivered: u64,
    pub stream_sequence: u64,
    pub consumer_sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub pending: u64,
}

impl AckReply {
    pub fn parse(subject: &str) -> Result<Self, MqError> {
        let invalid = || MqError::InvalidAckReply(subject.to_string());

        let tokens: Vec<&str> = subject.split('.').collect();
        if tokens.len() < 2 || tokens[..2].join(".") != ACK_PREFIX {
            return Err(invalid());
        }
        let fields = match tokens.len() {
            9 => &tokens[2..],
            11 | 12 => &tokens[4..11],
            _ => return Err(invalid()),
        };

        let number = |token: &str| token.parse::<u64>().map_err(|_| invalid());
        let nanos: i64 = fields[5].parse().map_err(|_| invalid())?;

        Ok(Self {
            stream: fields[0].to_string(),
            consumer: fields[1].to_string(),
            delivered: number(fields[2])?,
            stream_sequence: number(fields[3])?,
            consumer_sequence: number(fields[4])?,
            timestamp: DateTime::from_timestamp_nanos(nanos),
            pending: number(fields[6])?,
        })
    }

    /// Render the short layout.
    pub fn subject(&self) -> String {
        format!(
            "{ACK_PREFIX}.{}.{}.{}.{}.{}.{}.{}",
            self.stream,
            self.consumer,
            self.delivered,
            self.stream_sequence,
            self.consumer_sequence,
            self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            self.pending,
        )
    }
}

pub fn is_ack_subject(subject: &str) -> bool {
    subject
        .strip_prefix(ACK_PREFIX)
        .is_some_and(|rest| rest.starts_with('.'))
}
