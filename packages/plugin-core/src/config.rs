use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    /// Directory holding one sub-directory (with a `plugin.toml`) per plugin bundle.
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,
    #[serde(default = "default_enable_wasi")]
    pub enable_wasi: bool,
    /// Upper bound for a single hook callback, in milliseconds. Unset means no limit.
    #[serde(default)]
    pub hook_timeout_ms: Option<u64>,
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("./plugins")
}

fn default_enable_wasi() -> bool {
    true
}

impl PluginConfig {
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            enable_wasi: default_enable_wasi(),
            hook_timeout_ms: None,
        }
    }
}
