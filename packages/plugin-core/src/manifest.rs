use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PluginError;

/// Structured plugin definition, as catalogued by the marketplace or shipped
/// in a bundle's `plugin.toml`.
///
/// Required fields default to empty so that a missing field surfaces through
/// [`PluginManifest::validate`] instead of a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,

    /// Entry point. A path ending in `.wasm` is loaded through Extism, anything
    /// else names a native implementation registered by the host.
    #[serde(default)]
    pub main: String,

    /// Hook names the plugin subscribes to.
    #[serde(default)]
    pub hooks: Vec<String>,

    /// Capabilities requested by the plugin, copied onto each installation.
    #[serde(default)]
    pub permissions: Vec<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub settings: Vec<SettingDefinition>,
}

impl PluginManifest {
    /// Checks structural completeness. Every problem is reported in one error.
    pub fn validate(&self) -> Result<(), PluginError> {
        let mut problems = Vec::new();

        let required = [
            ("name", &self.name),
            ("version", &self.version),
            ("description", &self.description),
            ("author", &self.author),
            ("main", &self.main),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            problems.push(format!("missing required fields: {}", missing.join(", ")));
        }

        let mut seen = HashSet::new();
        for def in &self.settings {
            if def.key.trim().is_empty() {
                problems.push("setting key must not be empty".to_string());
                continue;
            }
            if !seen.insert(def.key.as_str()) {
                problems.push(format!("duplicate setting key '{}'", def.key));
            }
            if let Some(default) = &def.default
                && !default.is_null()
                && !def.setting_type.check(default)
            {
                problems.push(format!(
                    "default for setting '{}' is not a {}",
                    def.key, def.setting_type
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PluginError::InvalidManifest(problems.join("; ")))
        }
    }

    pub fn setting(&self, key: &str) -> Option<&SettingDefinition> {
        self.settings.iter().find(|s| s.key == key)
    }

    /// Whether the entry point should be loaded as a WebAssembly module.
    pub fn is_wasm(&self) -> bool {
        self.main.ends_with(".wasm")
    }
}

impl Display for PluginManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (v{})", self.name, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    String,
    Number,
    Boolean,
    Json,
}

impl SettingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingType::String => "string",
            SettingType::Number => "number",
            SettingType::Boolean => "boolean",
            SettingType::Json => "json",
        }
    }

    /// Returns true when `value` has the JSON shape this type declares.
    pub fn check(&self, value: &Value) -> bool {
        match self {
            SettingType::String => value.is_string(),
            SettingType::Number => value.is_number(),
            SettingType::Boolean => value.is_boolean(),
            SettingType::Json => true,
        }
    }

    /// What a setting of this type reads as before anything is stored.
    pub fn unset_value(&self) -> Value {
        match self {
            SettingType::String => Value::String(String::new()),
            _ => Value::Null,
        }
    }
}

impl Display for SettingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingType {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(SettingType::String),
            "number" => Ok(SettingType::Number),
            "boolean" => Ok(SettingType::Boolean),
            "json" => Ok(SettingType::Json),
            other => Err(PluginError::InvalidManifest(format!(
                "unknown setting type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDefinition {
    pub key: String,
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SettingDefinition {
    /// JSON text stored when an installation is first seeded.
    /// Empty when no default is declared.
    pub fn seed_value(&self) -> String {
        self.default
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    /// Value a fresh installation sees: the default, or the type's unset value.
    pub fn initial_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.setting_type.unset_value())
    }
}
