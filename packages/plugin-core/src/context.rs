use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::PluginId;

/// Execution context for one installation, built fresh for every facade or
/// hook invocation and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginContext {
    pub user_id: String,
    pub organization_id: Option<String>,
    pub plugin_id: PluginId,
    pub installation_id: i32,
    pub settings: Map<String, Value>,
    pub permissions: Vec<String>,
}

impl PluginContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }
}
