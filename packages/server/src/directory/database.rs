use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use common::StationName;

use super::{ConnectionRecord, Directory, DlsConfiguration, ProducerRecord, Station};
use crate::entity::{connection, producer, station};
use crate::error::DirectoryError;

/// [`Directory`] backed by the SQL tables of the broker's metadata store.
#[derive(Clone)]
pub struct DbDirectory {
    db: DatabaseConnection,
}

impl DbDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl From<station::Model> for Station {
    fn from(model: station::Model) -> Self {
        Self {
            name: StationName::from_intern(&common::station::replace_delimiters(&model.name)),
            is_native: model.is_native,
            dls_configuration: DlsConfiguration {
                poison: model.dls_poison,
            },
        }
    }
}

#[async_trait]
impl Directory for DbDirectory {
    async fn find_station(&self, name: &StationName) -> Result<Option<Station>, DirectoryError> {
        let model = station::Entity::find()
            .filter(station::Column::Name.eq(name.ext()))
            .filter(station::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(model.map(Station::from))
    }

    async fn find_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, DirectoryError> {
        let model = connection::Entity::find_by_id(connection_id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(|c| ConnectionRecord {
            id: c.id,
            client_address: c.client_address,
        }))
    }

    async fn find_producer(
        &self,
        name: &str,
        connection_id: &str,
    ) -> Result<Option<ProducerRecord>, DirectoryError> {
        let model = producer::Entity::find()
            .filter(producer::Column::Name.eq(name))
            .filter(producer::Column::ConnectionId.eq(connection_id))
            .one(&self.db)
            .await?;
        Ok(model.map(|p| ProducerRecord {
            name: p.name,
            connection_id: p.connection_id,
            created_by_user: p.created_by_username,
            is_active: p.is_active,
            is_deleted: p.is_deleted,
        }))
    }
}
