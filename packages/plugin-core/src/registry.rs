use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::json;
use tracing::{instrument, warn};

use crate::PluginId;
use crate::activity::{ActivityEntry, ActivitySink, LogLevel};
use crate::error::PluginError;
use crate::hook::{DEFAULT_PRIORITY, HookDispatcher, PluginHook};
use crate::manifest::PluginManifest;
use crate::traits::Plugin;

/// Represents an entry in the plugin registry.
pub struct PluginEntry {
    pub id: PluginId,
    pub manifest: PluginManifest,
    pub instance: Arc<dyn Plugin>,
    /// Hook names actually bound in the dispatcher.
    pub hooks: Vec<String>,
}

/// Represents the public information about a registered plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub id: PluginId,
    #[serde(flatten)]
    pub manifest: PluginManifest,
    pub bound_hooks: Vec<String>,
}

impl From<&PluginEntry> for PluginInfo {
    fn from(entry: &PluginEntry) -> Self {
        Self {
            id: entry.id,
            manifest: entry.manifest.clone(),
            bound_hooks: entry.hooks.clone(),
        }
    }
}

/// Process-local map of registered plugin implementations.
pub struct PluginRegistry {
    entries: RwLock<HashMap<PluginId, PluginEntry>>,
    dispatcher: Arc<HookDispatcher>,
    sink: Arc<dyn ActivitySink>,
}

impl PluginRegistry {
    pub fn new(dispatcher: Arc<HookDispatcher>, sink: Arc<dyn ActivitySink>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dispatcher,
            sink,
        }
    }

    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Validate, initialize and store a plugin, then bind its declared hooks.
    ///
    /// Registering an id again replaces the previous instance and its hooks.
    #[instrument(skip(self, plugin, manifest), fields(name = %manifest.name))]
    pub async fn register_plugin(
        &self,
        plugin_id: PluginId,
        plugin: Arc<dyn Plugin>,
        manifest: PluginManifest,
    ) -> Result<(), PluginError> {
        if let Err(e) = manifest.validate() {
            self.sink
                .record(
                    ActivityEntry::system(
                        plugin_id,
                        LogLevel::Error,
                        format!("Plugin registration rejected: {e}"),
                    )
                    .with_context(json!({ "error": e.to_string() })),
                )
                .await;
            return Err(e);
        }

        if let Err(e) = plugin.initialize().await {
            let error = e.to_string();
            self.sink
                .record(
                    ActivityEntry::system(
                        plugin_id,
                        LogLevel::Error,
                        format!("Plugin '{}' failed to initialize: {error}", manifest.name),
                    )
                    .with_context(json!({ "error": error })),
                )
                .await;
            return Err(PluginError::InitializationFailed(error));
        }

        self.dispatcher.unregister_plugin(plugin_id);

        let mut hooks = Vec::new();
        for hook_name in &manifest.hooks {
            if !plugin.handles(hook_name) {
                warn!(hook = %hook_name, "Declared hook has no handler, skipping");
                continue;
            }
            self.dispatcher.register(
                plugin_id,
                hook_name,
                DEFAULT_PRIORITY,
                Arc::new(PluginHook::new(plugin.clone(), hook_name.clone())),
            );
            hooks.push(hook_name.clone());
        }

        let message = format!("Plugin {manifest} registered");
        {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            entries.insert(
                plugin_id,
                PluginEntry {
                    id: plugin_id,
                    manifest,
                    instance: plugin,
                    hooks: hooks.clone(),
                },
            );
        }

        self.sink
            .record(
                ActivityEntry::system(plugin_id, LogLevel::Info, message)
                    .with_context(json!({ "hooks": hooks })),
            )
            .await;
        Ok(())
    }

    /// Remove a plugin and every hook it owns. Returns false if it was not registered.
    pub fn unregister_plugin(&self, plugin_id: PluginId) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&plugin_id)
            .is_some();
        self.dispatcher.unregister_plugin(plugin_id);
        removed
    }

    pub fn is_registered(&self, plugin_id: PluginId) -> bool {
        self.entries
            .read()
            .map(|r| r.contains_key(&plugin_id))
            .unwrap_or(false)
    }

    pub fn get(&self, plugin_id: PluginId) -> Option<PluginInfo> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&plugin_id)
            .map(PluginInfo::from)
    }

    pub fn list(&self) -> Vec<PluginInfo> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<PluginInfo> = entries.values().map(PluginInfo::from).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}
