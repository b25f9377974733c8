use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::PluginError;
use crate::manifest::PluginManifest;

pub const MANIFEST_FILE: &str = "plugin.toml";

/// A plugin bundle on disk (parsed manifest + root directory), before it is
/// catalogued or loaded into the runtime.
#[derive(Debug)]
pub struct PluginBundle {
    pub manifest: PluginManifest,
    pub root_dir: PathBuf,
}

impl PluginBundle {
    /// Loads a plugin bundle from a directory by parsing its `plugin.toml`.
    pub fn load_from_dir(plugin_dir: &Path) -> Result<Self, PluginError> {
        if !plugin_dir.is_dir() {
            return Err(PluginError::NotFound(plugin_dir.display().to_string()));
        }

        let toml_path = plugin_dir.join(MANIFEST_FILE);
        let toml_content = fs::read_to_string(&toml_path)
            .map_err(|e| PluginError::LoadFailed(format!("Failed to read plugin.toml: {}", e)))?;

        let manifest: PluginManifest = toml::from_str(&toml_content)
            .map_err(|e| PluginError::LoadFailed(format!("Invalid plugin.toml syntax: {}", e)))?;

        Ok(Self {
            manifest,
            root_dir: plugin_dir.to_path_buf(),
        })
    }

    /// Scans `plugins_dir` for bundles. Directories without a readable manifest
    /// are skipped with a warning.
    pub fn discover(plugins_dir: &Path) -> Result<Vec<Self>, PluginError> {
        let mut bundles = Vec::new();
        if !plugins_dir.is_dir() {
            return Ok(bundles);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(plugins_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            match Self::load_from_dir(&dir) {
                Ok(bundle) => bundles.push(bundle),
                Err(e) => warn!(dir = %dir.display(), "Skipping plugin bundle: {}", e),
            }
        }
        Ok(bundles)
    }

    /// Absolute path of the manifest's entry point.
    pub fn entry_path(&self) -> PathBuf {
        self.root_dir.join(&self.manifest.main)
    }
}
