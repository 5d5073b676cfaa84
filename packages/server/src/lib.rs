pub mod config;
pub mod consumers;
pub mod database;
pub mod directory;
pub mod dls;
pub mod entity;
pub mod error;
pub mod notifications;
pub mod state;
