use std::fmt;

use thiserror::Error;

/// Token separator of the log store's subject hierarchy.
pub const SUBJECT_DELIMITER: char = '.';

/// Stand-in for [`SUBJECT_DELIMITER`] inside internal (stream/consumer) names.
pub const DELIMITER_REPLACEMENT: char = '#';

const MAX_STATION_NAME_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StationNameError {
    #[error("station name can not be empty")]
    Empty,

    #[error("station name should be at most {MAX_STATION_NAME_LEN} characters, got {0}")]
    TooLong(usize),

    #[error("station name contains an invalid character '{0}'")]
    InvalidCharacter(char),

    #[error("station name can not start or end with '{0}'")]
    InvalidEdge(char),
}

/// A validated station name.
///
/// The external form is what users see. The internal form has every subject
/// delimiter replaced so it can be used as a stream name and as a single
/// subject token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StationName {
    external: String,
    internal: String,
}

impl StationName {
    pub fn new(name: &str) -> Result<Self, StationNameError> {
        let external = name.trim().to_lowercase();

        if external.is_empty() {
            return Err(StationNameError::Empty);
        }
        let len = external.chars().count();
        if len > MAX_STATION_NAME_LEN {
            return Err(StationNameError::TooLong(len));
        }
        if let Some(c) = external
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(*c)))
        {
            return Err(StationNameError::InvalidCharacter(c));
        }
        for edge in [external.chars().next(), external.chars().last()]
            .into_iter()
            .flatten()
        {
            if "._-".contains(edge) {
                return Err(StationNameError::InvalidEdge(edge));
            }
        }

        let internal = replace_delimiters(&external);
        Ok(Self { external, internal })
    }

    /// Rebuild a station name from its internal form (e.g. a stream name
    /// taken from a broker advisory). No validation is applied.
    pub fn from_intern(internal: &str) -> Self {
        Self {
            external: revert_delimiters(internal),
            internal: internal.to_string(),
        }
    }

    pub fn ext(&self) -> &str {
        &self.external
    }

    pub fn intern(&self) -> &str {
        &self.internal
    }

    /// Name of the stream holding this station's dead-letter records.
    pub fn dls_stream(&self) -> String {
        dls_stream_name(&self.internal)
    }
}

impl fmt::Display for StationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.external)
    }
}

/// Dead-letter stream name for a station's internal name.
pub fn dls_stream_name(station_intern: &str) -> String {
    format!("$memphis-{station_intern}-dls")
}

pub fn replace_delimiters(name: &str) -> String {
    name.replace(SUBJECT_DELIMITER, &DELIMITER_REPLACEMENT.to_string())
}

pub fn revert_delimiters(name: &str) -> String {
    name.replace(DELIMITER_REPLACEMENT, &SUBJECT_DELIMITER.to_string())
}
