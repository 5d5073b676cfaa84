//! Lookup of station, connection and producer metadata.

mod database;

pub use database::DbDirectory;

use async_trait::async_trait;

use common::StationName;

use crate::error::DirectoryError;

/// Which failure kinds a station records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlsConfiguration {
    pub poison: bool,
}

impl Default for DlsConfiguration {
    fn default() -> Self {
        Self { poison: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub name: StationName,
    pub is_native: bool,
    pub dls_configuration: DlsConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: String,
    pub client_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRecord {
    pub name: String,
    pub connection_id: String,
    pub created_by_user: String,
    pub is_active: bool,
    pub is_deleted: bool,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_station(&self, name: &StationName) -> Result<Option<Station>, DirectoryError>;

    async fn find_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, DirectoryError>;

    async fn find_producer(
        &self,
        name: &str,
        connection_id: &str,
    ) -> Result<Option<ProducerRecord>, DirectoryError>;
}
