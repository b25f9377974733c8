pub mod activity;
pub mod config;
pub mod context;
pub mod error;
pub mod hook;
pub mod host_api;
mod host_fns;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod runtime;
pub mod traits;

/// Catalog identifier of a plugin.
pub type PluginId = i32;

pub use activity::{ActivityEntry, ActivitySink, LogLevel, TracingSink};
pub use config::PluginConfig;
pub use context::PluginContext;
pub use error::PluginError;
pub use hook::{HookDispatcher, HookOutcome};
pub use host_api::{HostApi, HostHandle, Resource};
pub use loader::PluginBundle;
pub use manifest::{PluginManifest, SettingDefinition, SettingType};
pub use registry::PluginRegistry;
pub use runtime::WasmPlugin;
pub use traits::Plugin;
