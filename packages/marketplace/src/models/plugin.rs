use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::plugin;

/// A catalog entry.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PluginResponse {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = "Slack Notifier")]
    pub name: String,
    #[schema(example = "1.0.0")]
    pub version: String,
    pub author: String,
    pub description: String,
    /// Number of current installations.
    #[schema(example = 3)]
    pub install_count: i32,
    /// Hook names the plugin subscribes to.
    pub hooks: Vec<String>,
    /// Permissions copied onto every installation.
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<plugin::Model> for PluginResponse {
    fn from(m: plugin::Model) -> Self {
        let list = |field: &str| -> Vec<String> {
            m.manifest
                .get(field)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default()
        };
        let hooks = list("hooks");
        let permissions = list("permissions");
        Self {
            id: m.id,
            name: m.name,
            version: m.version,
            author: m.author,
            description: m.description,
            install_count: m.install_count,
            hooks,
            permissions,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct InstallPluginResponse {
    #[schema(example = 1)]
    pub installation_id: i32,
}

/// Payload passed to every callback bound to the hook.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct DispatchHookRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DispatchHookResponse {
    #[schema(example = "onPaymentReceived")]
    pub hook: String,
    /// One entry per callback run, in priority order. A failed callback
    /// contributes `{"error": "..."}`.
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<Value>,
}
