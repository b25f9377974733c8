use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{plugin_installation, plugin_log, plugin_setting};
use crate::services::installation::UserPlugin;
use crate::services::settings::decode_value;

#[derive(Serialize, utoipa::ToSchema)]
pub struct InstallationResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = 7)]
    pub plugin_id: i32,
    /// Catalog name, present in listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_name: Option<String>,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub version: String,
    pub is_active: bool,
    pub is_enabled: bool,
    #[schema(value_type = Object)]
    pub settings: Value,
    pub permissions: Vec<String>,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<plugin_installation::Model> for InstallationResponse {
    fn from(m: plugin_installation::Model) -> Self {
        let permissions = m.permission_list();
        Self {
            id: m.id,
            plugin_id: m.plugin_id,
            plugin_name: None,
            user_id: m.user_id,
            organization_id: m.organization_id,
            version: m.version,
            is_active: m.is_active,
            is_enabled: m.is_enabled,
            settings: m.settings,
            permissions,
            installed_at: m.installed_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<UserPlugin> for InstallationResponse {
    fn from(p: UserPlugin) -> Self {
        Self {
            plugin_name: Some(p.plugin_name),
            ..p.installation.into()
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct TogglePluginRequest {
    /// Sets both the active and enabled flags.
    pub is_active: bool,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SettingResponse {
    #[schema(example = "webhookUrl")]
    pub key: String,
    #[schema(value_type = Object)]
    pub value: Value,
    /// One of: string, number, boolean, json
    #[schema(example = "string")]
    pub setting_type: String,
    pub is_required: bool,
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<plugin_setting::Model> for SettingResponse {
    fn from(m: plugin_setting::Model) -> Self {
        let value = decode_value(&m);
        Self {
            key: m.setting_key,
            value,
            setting_type: m.setting_type,
            is_required: m.is_required,
            default_value: m.default_value,
            description: m.description,
            updated_at: m.updated_at,
        }
    }
}

/// Key to value map of settings to write. Keys must be declared by the plugin.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateSettingsRequest {
    #[schema(value_type = Object)]
    pub settings: Map<String, Value>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SettingsSnapshotResponse {
    #[schema(value_type = Object)]
    pub settings: Map<String, Value>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct LogQuery {
    /// Maximum entries to return (1-500, default 50).
    #[param(example = 50)]
    pub limit: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LogResponse {
    pub id: i32,
    pub plugin_id: i32,
    pub installation_id: Option<i32>,
    pub user_id: String,
    #[schema(example = "info")]
    pub level: String,
    pub message: String,
    #[schema(value_type = Object)]
    pub context: Value,
    pub execution_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<plugin_log::Model> for LogResponse {
    fn from(m: plugin_log::Model) -> Self {
        Self {
            id: m.id,
            plugin_id: m.plugin_id,
            installation_id: m.installation_id,
            user_id: m.user_id,
            level: m.level,
            message: m.message,
            context: m.context,
            execution_time_ms: m.execution_time_ms,
            created_at: m.created_at,
        }
    }
}
