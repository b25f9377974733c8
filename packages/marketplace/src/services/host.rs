use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use plugin_core::activity::{ActivityEntry, ActivitySink, LogLevel};
use plugin_core::error::PluginError;
use plugin_core::hook::{HookDispatcher, HookOutcome};
use plugin_core::{
    HostHandle, Plugin, PluginBundle, PluginConfig, PluginId, PluginManifest, PluginRegistry,
    WasmPlugin,
};
use sea_orm::*;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::entity::{plugin, plugin_installation};
use crate::error::AppError;
use crate::services::activity::ActivityLog;
use crate::services::api::{FinanceGateway, Notifier, NullFinanceGateway, NullNotifier, PluginApi};
use crate::services::catalog::manifest_of;

type NativeFactory = Box<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Turns a catalog manifest into a runnable plugin.
///
/// A `main` ending in `.wasm` is loaded from the bundle of the same name
/// under `plugins_dir`. Any other `main` must match a native factory.
pub struct PluginLoader {
    natives: HashMap<String, NativeFactory>,
    plugins_dir: PathBuf,
    enable_wasi: bool,
}

impl PluginLoader {
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            natives: HashMap::new(),
            plugins_dir: config.plugins_dir.clone(),
            enable_wasi: config.enable_wasi,
        }
    }

    pub fn with_native<F>(mut self, main: &str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.natives.insert(main.to_string(), Box::new(factory));
        self
    }

    pub fn resolve(&self, manifest: &PluginManifest) -> Result<Arc<dyn Plugin>, PluginError> {
        if !manifest.is_wasm() {
            let factory = self
                .natives
                .get(&manifest.main)
                .ok_or_else(|| PluginError::NotFound(manifest.main.clone()))?;
            return Ok(factory());
        }

        let bundle = PluginBundle::discover(&self.plugins_dir)?
            .into_iter()
            .find(|b| b.manifest.name == manifest.name)
            .ok_or_else(|| PluginError::NotFound(manifest.name.clone()))?;
        let plugin = WasmPlugin::load(&bundle.entry_path(), self.enable_wasi)?;
        Ok(Arc::new(plugin))
    }
}

/// Process-wide plugin runtime: registry, dispatcher, activity log and the
/// collaborators exposed through the plugin API.
pub struct PluginHost {
    registry: PluginRegistry,
    activity: Arc<ActivityLog>,
    loader: PluginLoader,
    finance: Arc<dyn FinanceGateway>,
    notifier: Arc<dyn Notifier>,
}

impl PluginHost {
    pub fn new(db: DatabaseConnection, config: &PluginConfig, loader: PluginLoader) -> Self {
        let activity = Arc::new(ActivityLog::new(db));
        let dispatcher =
            Arc::new(HookDispatcher::new(activity.clone()).with_timeout(config.hook_timeout()));
        Self {
            registry: PluginRegistry::new(dispatcher, activity.clone()),
            activity,
            loader,
            finance: Arc::new(NullFinanceGateway),
            notifier: Arc::new(NullNotifier),
        }
    }

    pub fn with_finance(mut self, finance: Arc<dyn FinanceGateway>) -> Self {
        self.finance = finance;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &HookDispatcher {
        self.registry.dispatcher()
    }

    pub fn finance(&self) -> &dyn FinanceGateway {
        self.finance.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub async fn record(&self, entry: ActivityEntry) {
        self.activity.record(entry).await;
    }

    pub async fn log_plugin(
        &self,
        plugin_id: PluginId,
        installation_id: Option<i32>,
        level: LogLevel,
        message: impl Into<String>,
        context: Value,
    ) {
        self.activity
            .log_plugin(plugin_id, installation_id, level, message, context)
            .await;
    }

    /// Register the implementation behind a catalog entry unless it already is.
    pub async fn ensure_registered(&self, entry: &plugin::Model) -> Result<(), AppError> {
        if self.registry.is_registered(entry.id) {
            return Ok(());
        }
        let manifest = manifest_of(entry)?;
        let instance = self.loader.resolve(&manifest)?;
        self.registry
            .register_plugin(entry.id, instance, manifest)
            .await?;
        Ok(())
    }

    /// Rebuild the in-memory registry from persisted installations, inactive
    /// ones included so that reactivating them needs no reload.
    /// Plugins that fail to load are skipped. Returns how many were registered.
    #[instrument(skip(self, conn))]
    pub async fn restore<C: ConnectionTrait>(&self, conn: &C) -> Result<usize, AppError> {
        let plugin_ids: Vec<i32> = plugin_installation::Entity::find()
            .select_only()
            .column(plugin_installation::Column::PluginId)
            .distinct()
            .into_tuple()
            .all(conn)
            .await?;

        let entries = plugin::Entity::find()
            .filter(plugin::Column::Id.is_in(plugin_ids))
            .all(conn)
            .await?;

        let mut restored = 0;
        for entry in &entries {
            match self.ensure_registered(entry).await {
                Ok(()) => restored += 1,
                Err(e) => warn!(plugin_id = entry.id, "Failed to restore plugin: {}", e),
            }
        }
        info!(restored, "Plugin registry restored");
        Ok(restored)
    }

    /// Drop a plugin's hooks once no installation of it remains.
    pub async fn release_if_unused<C: ConnectionTrait>(
        &self,
        conn: &C,
        plugin_id: PluginId,
    ) -> Result<bool, AppError> {
        let remaining = plugin_installation::Entity::find()
            .filter(plugin_installation::Column::PluginId.eq(plugin_id))
            .count(conn)
            .await?;
        if remaining > 0 {
            return Ok(false);
        }
        Ok(self.registry.unregister_plugin(plugin_id))
    }

    /// Fire `hook` for every live installation the user owns. Each callback
    /// gets a [`PluginApi`] scoped to its own installation.
    #[instrument(skip(self, db, data))]
    pub async fn dispatch(
        self: &Arc<Self>,
        db: &DatabaseConnection,
        hook: &str,
        data: &Value,
        user_id: &str,
    ) -> Result<Vec<HookOutcome>, AppError> {
        let installations = plugin_installation::Entity::find()
            .filter(plugin_installation::Column::UserId.eq(user_id))
            .all(db)
            .await?;

        let mut hosts: HashMap<PluginId, HostHandle> = HashMap::new();
        for installation in installations.iter().filter(|i| i.is_live()) {
            let api = PluginApi::from_installation(db.clone(), self.clone(), installation).await?;
            hosts.insert(installation.plugin_id, Arc::new(api));
        }

        Ok(self.dispatcher().execute_hook_for(hook, data, &hosts).await)
    }
}
