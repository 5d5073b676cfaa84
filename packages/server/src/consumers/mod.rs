pub mod poison;

pub use poison::listen_for_poison_messages;
