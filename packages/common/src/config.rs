use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Connection settings for the durable log store.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// NATS server URL. Default: "nats://localhost:4222".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Timeout applied to each API request. Default: 5000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Name announced to the server. Default: "dls-server".
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
}

fn default_mq_url() -> String {
    "nats://localhost:4222".into()
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_connection_name() -> String {
    "dls-server".into()
}

impl MqAppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            request_timeout_ms: default_request_timeout_ms(),
            connection_name: default_connection_name(),
        }
    }
}

/// Dead-letter engine settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DlsConfig {
    /// Deadline of every replay scan. Default: 1000.
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    /// Maximum entries per listing partition. Default: 1000.
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    /// Capacity of the replay correlation channel. Default: 1024.
    #[serde(default = "default_reply_channel_capacity")]
    pub reply_channel_capacity: usize,
    /// Attempts made by the per-message aggregation before settling. Default: 3.
    #[serde(default = "default_aggregate_max_attempts")]
    pub aggregate_max_attempts: u8,
    #[serde(default = "default_aggregate_base_delay_ms")]
    pub aggregate_base_delay_ms: u64,
    #[serde(default = "default_aggregate_max_delay_ms")]
    pub aggregate_max_delay_ms: u64,
    /// Subject of the broker's max-deliveries advisories.
    #[serde(default = "default_advisory_subject")]
    pub advisory_subject: String,
    /// Queue group shared by all advisory listeners.
    #[serde(default = "default_listener_queue_group")]
    pub listener_queue_group: String,
    /// Base URL used in notification links. Default: "http://localhost:9000".
    #[serde(default = "default_ui_url")]
    pub ui_url: String,
}

fn default_scan_timeout_ms() -> u64 {
    1000
}
fn default_list_limit() -> usize {
    1000
}
fn default_reply_channel_capacity() -> usize {
    1024
}
fn default_aggregate_max_attempts() -> u8 {
    3
}
fn default_aggregate_base_delay_ms() -> u64 {
    50
}
fn default_aggregate_max_delay_ms() -> u64 {
    1000
}
fn default_advisory_subject() -> String {
    "$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.>".into()
}
fn default_listener_queue_group() -> String {
    "$memphis_poison_messages_listeners_group".into()
}
fn default_ui_url() -> String {
    "http://localhost:9000".into()
}

impl DlsConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn aggregate_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.aggregate_max_attempts,
            base_delay_ms: self.aggregate_base_delay_ms,
            max_delay_ms: self.aggregate_max_delay_ms,
        }
    }
}

impl Default for DlsConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: default_scan_timeout_ms(),
            list_limit: default_list_limit(),
            reply_channel_capacity: default_reply_channel_capacity(),
            aggregate_max_attempts: default_aggregate_max_attempts(),
            aggregate_base_delay_ms: default_aggregate_base_delay_ms(),
            aggregate_max_delay_ms: default_aggregate_max_delay_ms(),
            advisory_subject: default_advisory_subject(),
            listener_queue_group: default_listener_queue_group(),
            ui_url: default_ui_url(),
        }
    }
}
