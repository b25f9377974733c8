use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use extism::{Manifest, UserData, Wasm};
use serde_json::{Value, json};
use tokio::runtime::Handle;

use crate::error::PluginError;
use crate::host_api::HostHandle;
use crate::host_fns::{self, CallScope};
use crate::traits::Plugin;

/// Optional export called once when a Wasm plugin is registered.
pub const INIT_EXPORT: &str = "initialize";

/// A plugin backed by a Wasm module.
///
/// Each hook name maps to an export of the same name, called with
/// `{"data": ..., "context": ...}` as JSON. Extism instances are stateful and
/// single-threaded, so calls are serialized through a mutex and run on the
/// blocking pool. The installation's host is attached to the linked host
/// functions for the length of each hook call.
pub struct WasmPlugin {
    inner: Arc<Mutex<extism::Plugin>>,
    scope: UserData<CallScope>,
}

impl WasmPlugin {
    /// Compile the module at `wasm_path` and link the host functions.
    pub fn load(wasm_path: &Path, enable_wasi: bool) -> Result<Self, PluginError> {
        if !wasm_path.is_file() {
            return Err(PluginError::NotFound(format!(
                "wasm module {}",
                wasm_path.display()
            )));
        }
        let scope = UserData::new(CallScope::None);
        let manifest = Manifest::new([Wasm::file(wasm_path)]);
        let plugin = extism::Plugin::new(&manifest, host_fns::functions(&scope), enable_wasi)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(plugin)),
            scope,
        })
    }

    /// Call `export` off the async workers, with `host` reachable from host functions.
    async fn call(
        &self,
        export: String,
        input: Vec<u8>,
        host: Option<HostHandle>,
    ) -> anyhow::Result<Vec<u8>> {
        let inner = self.inner.clone();
        let scope = self.scope.clone();
        let attached = host.map(|host| (host, Handle::current()));

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let mut plugin = inner
                .lock()
                .map_err(|_| anyhow!("wasm instance poisoned by an earlier panic"))?;
            host_fns::attach(&scope, attached)?;
            let output: anyhow::Result<Vec<u8>> = plugin.call(&export, input);
            host_fns::attach(&scope, None)?;
            output
        })
        .await?
    }
}

#[async_trait]
impl Plugin for WasmPlugin {
    async fn initialize(&self) -> anyhow::Result<()> {
        if self.handles(INIT_EXPORT) {
            self.call(INIT_EXPORT.to_string(), Vec::new(), None).await?;
        }
        Ok(())
    }

    fn handles(&self, hook: &str) -> bool {
        self.inner
            .lock()
            .map(|p| p.function_exists(hook))
            .unwrap_or(false)
    }

    async fn on_hook(&self, hook: &str, data: &Value, host: HostHandle) -> anyhow::Result<Value> {
        let input = serde_json::to_vec(&json!({ "data": data, "context": host.context() }))?;
        let output = self.call(hook.to_string(), input, Some(host)).await?;

        if output.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&output)?)
    }
}
