use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Key/value storage exposed to plugins through the API facade.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_storage")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub installation_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
