use mq::MqError;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors of the dead-letter engine.
#[derive(Debug, Error)]
pub enum DlsError {
    #[error("Log store error: {0}")]
    Store(#[from] MqError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("No dead-letter message with id {id} in station {station}")]
    NotFound { station: String, id: String },

    #[error("Malformed advisory: {0}")]
    MalformedAdvisory(String),

    #[error(
        "Message {seq} of station {station} is missing producer headers, please upgrade the SDK version you are using"
    )]
    MissingAttribution { station: String, seq: u64 },

    #[error("Station {0} does not exist")]
    StationNotFound(String),

    #[error("Connection {0} does not exist")]
    ConnectionNotFound(String),

    #[error("Producer {name} of connection {connection_id} does not exist")]
    ProducerNotFound { name: String, connection_id: String },

    #[error("Failed to decode dead-letter record at sequence {seq}: {source}")]
    Decode {
        seq: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode dead-letter record: {0}")]
    Encode(#[source] serde_json::Error),
}

impl DlsError {
    /// Errors caused by the content of a single event rather than by the infrastructure.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedAdvisory(_) | Self::MissingAttribution { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected with status {0}")]
    Rejected(u16),
}
