use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::PluginId;
use crate::activity::{ActivityEntry, ActivitySink, LogLevel};
use crate::host_api::{HostApi, HostHandle};
use crate::traits::Plugin;

/// Priority given to hooks bound from a manifest.
pub const DEFAULT_PRIORITY: i32 = 0;

/// A callable subscribed to a named hook.
#[async_trait]
pub trait HookCallback: Send + Sync {
    async fn call(&self, data: &Value, host: &HostHandle) -> anyhow::Result<Value>;
}

/// Hook bound to a handler on a registered plugin instance.
pub struct PluginHook {
    plugin: Arc<dyn Plugin>,
    hook_name: String,
}

impl PluginHook {
    pub fn new(plugin: Arc<dyn Plugin>, hook_name: String) -> Self {
        Self { plugin, hook_name }
    }
}

#[async_trait]
impl HookCallback for PluginHook {
    async fn call(&self, data: &Value, host: &HostHandle) -> anyhow::Result<Value> {
        self.plugin.on_hook(&self.hook_name, data, host.clone()).await
    }
}

/// Adapter for plain closures.
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> HookCallback for FnHook<F>
where
    F: Fn(&Value, &dyn HostApi) -> anyhow::Result<Value> + Send + Sync,
{
    async fn call(&self, data: &Value, host: &HostHandle) -> anyhow::Result<Value> {
        (self.0)(data, host.as_ref())
    }
}

#[derive(Clone)]
struct Registration {
    plugin_id: PluginId,
    priority: i32,
    callback: Arc<dyn HookCallback>,
}

/// Result of one callback within a dispatch, in dispatch order.
///
/// Serializes as the callback's value, or as `{"error": "..."}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HookOutcome {
    Failed { error: String },
    Value(Value),
}

impl HookOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, HookOutcome::Failed { .. })
    }
}

/// Named-hook callback lists with failure isolation per callback.
///
/// Registrations are process-local; they are rebuilt whenever plugins are
/// registered again.
pub struct HookDispatcher {
    hooks: RwLock<HashMap<String, Vec<Registration>>>,
    sink: Arc<dyn ActivitySink>,
    timeout: Option<Duration>,
}

impl HookDispatcher {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
            sink,
            timeout: None,
        }
    }

    /// Bound every callback invocation. A callback exceeding it counts as failed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(
        &self,
        plugin_id: PluginId,
        hook_name: &str,
        priority: i32,
        callback: Arc<dyn HookCallback>,
    ) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        hooks
            .entry(hook_name.to_string())
            .or_default()
            .push(Registration {
                plugin_id,
                priority,
                callback,
            });
    }

    pub fn register_fn<F>(&self, plugin_id: PluginId, hook_name: &str, priority: i32, f: F)
    where
        F: Fn(&Value, &dyn HostApi) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(plugin_id, hook_name, priority, Arc::new(FnHook(f)));
    }

    /// Drop every callback owned by `plugin_id`. Returns how many were removed.
    pub fn unregister_plugin(&self, plugin_id: PluginId) -> usize {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        hooks.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|r| r.plugin_id != plugin_id);
            removed += before - registrations.len();
            !registrations.is_empty()
        });
        removed
    }

    pub fn hook_count(&self, hook_name: &str) -> usize {
        self.hooks
            .read()
            .map(|h| h.get(hook_name).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Callbacks for `hook_name`, highest priority first, ties in registration order.
    fn ordered(&self, hook_name: &str) -> Vec<Registration> {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        let mut registrations = hooks.get(hook_name).cloned().unwrap_or_default();
        registrations.sort_by(|a, b| b.priority.cmp(&a.priority));
        registrations
    }

    /// Run every callback for `hook_name` against the same host.
    #[instrument(skip(self, data, host), fields(installation_id = host.context().installation_id))]
    pub async fn execute_hook(
        &self,
        hook_name: &str,
        data: &Value,
        host: &HostHandle,
    ) -> Vec<HookOutcome> {
        let mut results = Vec::new();
        for registration in self.ordered(hook_name) {
            results.push(self.invoke(hook_name, &registration, data, host).await);
        }
        results
    }

    /// Run each callback against the host of its owning plugin's installation.
    /// Callbacks whose plugin has no entry in `hosts` are skipped.
    #[instrument(skip(self, data, hosts))]
    pub async fn execute_hook_for(
        &self,
        hook_name: &str,
        data: &Value,
        hosts: &HashMap<PluginId, HostHandle>,
    ) -> Vec<HookOutcome> {
        let mut results = Vec::new();
        for registration in self.ordered(hook_name) {
            let Some(host) = hosts.get(&registration.plugin_id) else {
                continue;
            };
            results.push(self.invoke(hook_name, &registration, data, host).await);
        }
        results
    }

    async fn invoke(
        &self,
        hook_name: &str,
        registration: &Registration,
        data: &Value,
        host: &HostHandle,
    ) -> HookOutcome {
        let ctx = host.context();
        let started = Instant::now();
        let result = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, registration.callback.call(data, host)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("hook timed out after {}ms", limit.as_millis())),
                }
            }
            None => registration.callback.call(data, host).await,
        };
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                let entry = ActivityEntry::for_installation(
                    registration.plugin_id,
                    ctx,
                    LogLevel::Info,
                    format!("Hook '{hook_name}' executed"),
                )
                .with_context(json!({ "hook": hook_name, "priority": registration.priority }))
                .with_execution_time(elapsed);
                self.sink.record(entry).await;
                HookOutcome::Value(value)
            }
            Err(e) => {
                let error = e.to_string();
                let entry = ActivityEntry::for_installation(
                    registration.plugin_id,
                    ctx,
                    LogLevel::Error,
                    format!("Hook '{hook_name}' failed: {error}"),
                )
                .with_context(json!({ "hook": hook_name, "error": error }))
                .with_execution_time(elapsed);
                self.sink.record(entry).await;
                HookOutcome::Failed { error }
            }
        }
    }
}
