use thiserror::Error;

/// Failures raised while describing, loading or registering a plugin.
///
/// Hook callbacks report through `anyhow` instead, so a failing callback
/// never surfaces here.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Missing plugin, bundle, wasm file or native implementation.
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("failed to load plugin: {0}")]
    LoadFailed(String),

    #[error("plugin initialization failed: {0}")]
    InitializationFailed(String),

    #[error(transparent)]
    Wasm(#[from] extism::Error),

    #[error("malformed plugin data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
