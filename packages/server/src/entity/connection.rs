use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A client connection producers are attached to.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "connection")]
pub struct Model {
    /// Connection id as announced in message headers.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub client_address: String,

    pub created_by_username: String,

    #[sea_orm(default_value = true)]
    pub is_active: bool,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
