use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One user's installation of a catalog plugin.
/// At most one row per (plugin_id, user_id), enforced by a unique index.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_installation")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub plugin_id: i32,
    pub user_id: String,
    pub organization_id: Option<String>,

    /// Plugin version at install time.
    pub version: String,
    pub is_active: bool,
    pub is_enabled: bool,

    /// Snapshot of the materialized settings, refreshed on every settings write.
    #[sea_orm(column_type = "JsonBinary")]
    pub settings: Json,
    /// Permissions copied from the manifest at install time, as a JSON array.
    #[sea_orm(column_type = "JsonBinary")]
    pub permissions: Json,

    pub installed_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Whether hooks should be dispatched to this installation.
    pub fn is_live(&self) -> bool {
        self.is_active && self.is_enabled
    }

    pub fn permission_list(&self) -> Vec<String> {
        serde_json::from_value(self.permissions.clone()).unwrap_or_default()
    }
}

impl ActiveModelBehavior for ActiveModel {}
