use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only plugin activity record.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub plugin_id: i32,
    /// NULL for process-level events (registration, catalog sync).
    pub installation_id: Option<i32>,
    /// "system" for events not raised by a user.
    pub user_id: String,
    /// One of: debug, info, warn, error
    pub level: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub context: Json,
    pub execution_time_ms: Option<i64>,
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
