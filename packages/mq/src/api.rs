//! Raw JetStream pull protocol used by the replay consumer.

use serde::{Deserialize, Serialize};

const REQUEST_NEXT_PREFIX: &str = "$JS.API.CONSUMER.MSG.NEXT.";

/// Subject of a pull request for the next messages of a consumer.
pub fn request_next_subject(stream: &str, durable_name: &str) -> String {
    format!("{REQUEST_NEXT_PREFIX}{stream}.{durable_name}")
}

/// Split a pull request subject into `(stream, durable_name)`.
pub fn parse_request_next_subject(subject: &str) -> Option<(&str, &str)> {
    let rest = subject.strip_prefix(REQUEST_NEXT_PREFIX)?;
    let (stream, durable_name) = rest.split_once('.')?;
    if stream.is_empty() || durable_name.is_empty() || durable_name.contains('.') {
        return None;
    }
    Some((stream, durable_name))
}

/// Body of a pull request; `expires` is in nanoseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullNextRequest {
    #[serde(default)]
    pub batch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
}
