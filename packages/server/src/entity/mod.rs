pub mod connection;
pub mod producer;
pub mod station;
