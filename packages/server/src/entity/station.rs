use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "station")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// External station name.
    #[sea_orm(unique)]
    pub name: String,

    /// Whether producers use the native envelope with attribution headers.
    #[sea_orm(default_value = true)]
    pub is_native: bool,

    /// Record messages that exhausted their deliveries.
    #[sea_orm(default_value = true)]
    pub dls_poison: bool,

    #[sea_orm(default_value = false, indexed)]
    pub is_deleted: bool,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
