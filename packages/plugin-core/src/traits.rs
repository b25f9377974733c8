use async_trait::async_trait;
use serde_json::Value;

use crate::host_api::HostHandle;

/// A plugin implementation, native or Wasm-backed.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once when the plugin is registered. An error aborts registration.
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether the plugin exposes a handler for `hook`.
    fn handles(&self, hook: &str) -> bool;

    /// Handle one hook for the installation behind `host`. The installation's
    /// context is available through `host.context()`.
    async fn on_hook(&self, hook: &str, data: &Value, host: HostHandle) -> anyhow::Result<Value>;
}
