use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

use crate::config::DatabaseConfig;

/// Connect to the metadata store holding stations, connections and producers.
pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(connect_timeout)
        .acquire_timeout(connect_timeout)
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    if config.sync_schema {
        info!("Syncing directory tables");
        db.get_schema_registry("dls_server::entity::*")
            .sync(&db)
            .await?;
    }

    Ok(db)
}
