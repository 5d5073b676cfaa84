//! Canonical dead-letter subjects and message identifiers.
//!
//! Dead-letter records live under
//! `<dls stream>.<kind>.<id>[.<consumer group>]`, where `<dls stream>` is
//! [`dls_stream_name`] of the station. The same constructor builds literal
//! publish subjects and consumption filters: pass [`WILDCARD`] or
//! [`FULL_WILDCARD`] in place of a token to obtain a filter.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::station::{SUBJECT_DELIMITER, dls_stream_name};

/// Matches exactly one subject token.
pub const WILDCARD: &str = "*";

/// Matches one or more trailing subject tokens.
pub const FULL_WILDCARD: &str = ">";

/// Producer name recorded for messages sent without native attribution.
pub const NON_NATIVE_PRODUCER: &str = "nonNative";

const ID_SEPARATOR: &str = "~";
const ID_DELIMITER_ESCAPE: &str = "+";

/// Kind of dead-letter record, encoded as the first token after the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlsKind {
    /// A consumer group exhausted its redelivery attempts.
    Poison,
    /// The message failed schema validation.
    Schema,
}

impl DlsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poison => "poison",
            Self::Schema => "schema",
        }
    }
}

impl fmt::Display for DlsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DlsKind {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poison" => Ok(Self::Poison),
            "schema" => Ok(Self::Schema),
            other => Err(SubjectError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("subject '{subject}' does not belong to stream '{stream}'")]
    ForeignStream { subject: String, stream: String },

    #[error("subject '{0}' has too few tokens")]
    TooFewTokens(String),

    #[error("unknown dead-letter kind '{0}'")]
    UnknownKind(String),

    #[error("poison subject '{0}' is missing its consumer group")]
    MissingGroup(String),

    #[error("schema subject '{0}' can not carry a consumer group")]
    UnexpectedGroup(String),
}

/// Deterministic identifier of one dead-lettered original message.
///
/// Equal inputs always give the same id. Spaces are stripped and subject
/// delimiters escaped so the id fits in a single subject token. Distinct
/// inputs that collapse to the same string after stripping collide.
pub fn dls_msg_id(
    station_intern: &str,
    message_seq: u64,
    producer_name: &str,
    time_sent: &str,
) -> String {
    let producer = if producer_name.is_empty() {
        NON_NATIVE_PRODUCER
    } else {
        producer_name
    };

    [
        station_intern,
        producer,
        &message_seq.to_string(),
        time_sent,
    ]
    .join(ID_SEPARATOR)
    .replace(' ', "")
    .replace(SUBJECT_DELIMITER, ID_DELIMITER_ESCAPE)
}

/// Timestamp rendering fed into [`dls_msg_id`].
pub fn identity_timestamp(time_sent: DateTime<Utc>) -> String {
    time_sent.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Build a dead-letter subject or filter.
///
/// `kind`, `id` and `group` each accept a literal token or [`WILDCARD`];
/// `group` also accepts [`FULL_WILDCARD`]. An empty `group` omits the
/// trailing token, which is the shape of schema-kind subjects.
pub fn dls_subject(kind: &str, station_intern: &str, id: &str, group: &str) -> String {
    let mut subject = format!(
        "{stream}{d}{kind}{d}{id}",
        stream = dls_stream_name(station_intern),
        d = SUBJECT_DELIMITER,
    );
    if !group.is_empty() {
        subject.push(SUBJECT_DELIMITER);
        subject.push_str(group);
    }
    subject
}

/// A dead-letter subject decomposed into its typed parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlsSubject {
    pub kind: DlsKind,
    pub id: String,
    pub group: Option<String>,
}

impl DlsSubject {
    /// Parse a subject read back from the dead-letter stream of `station_intern`.
    pub fn parse(subject: &str, station_intern: &str) -> Result<Self, SubjectError> {
        let stream = dls_stream_name(station_intern);
        let rest = subject
            .strip_prefix(stream.as_str())
            .and_then(|rest| rest.strip_prefix(SUBJECT_DELIMITER))
            .ok_or_else(|| SubjectError::ForeignStream {
                subject: subject.to_string(),
                stream: stream.clone(),
            })?;

        let mut tokens = rest.splitn(3, SUBJECT_DELIMITER);
        let (Some(kind), Some(id)) = (tokens.next(), tokens.next()) else {
            return Err(SubjectError::TooFewTokens(subject.to_string()));
        };
        if id.is_empty() {
            return Err(SubjectError::TooFewTokens(subject.to_string()));
        }
        let kind: DlsKind = kind.parse()?;
        let group = tokens.next().filter(|g| !g.is_empty()).map(str::to_string);

        match (kind, &group) {
            (DlsKind::Poison, None) => Err(SubjectError::MissingGroup(subject.to_string())),
            (DlsKind::Schema, Some(_)) => Err(SubjectError::UnexpectedGroup(subject.to_string())),
            _ => Ok(Self {
                kind,
                id: id.to_string(),
                group,
            }),
        }
    }
}

/// Subject matching with the log store's wildcard rules.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split(SUBJECT_DELIMITER);
    let mut subject_tokens = subject.split(SUBJECT_DELIMITER);

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(FULL_WILDCARD), Some(_)) => return filter_tokens.next().is_none(),
            (Some(WILDCARD), Some(_)) => {}
            (Some(f), Some(s)) if f == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
