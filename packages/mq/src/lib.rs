pub mod ack;
pub mod api;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod nats;
pub mod replay;
pub mod store;

pub use ack::AckReply;
pub use config::{AckPolicy, ConsumerConfig, DeliverPolicy};
pub use error::MqError;
pub use memory::MemoryLogStore;
pub use models::{ConsumerState, Delivery, StoredMessage, StreamState, Subscription};
pub use nats::{NatsLogStore, init_mq};
pub use replay::{FilteredScan, REPLAY_CONSUMER_PREFIX, ReplayEngine, ReplayedMessage};
pub use store::LogStore;
