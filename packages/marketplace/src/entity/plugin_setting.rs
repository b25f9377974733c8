use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_setting")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub installation_id: i32,
    pub setting_key: String,

    /// JSON text of the value. Empty when seeded without a default.
    #[sea_orm(column_type = "Text")]
    pub setting_value: String,
    /// One of: string, number, boolean, json
    pub setting_type: String,
    pub is_required: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub default_value: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
