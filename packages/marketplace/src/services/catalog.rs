use std::path::Path;

use chrono::Utc;
use plugin_core::PluginBundle;
use plugin_core::manifest::PluginManifest;
use sea_orm::*;
use tracing::{info, instrument, warn};

use crate::entity::plugin;
use crate::error::AppError;

/// Outcome of a catalog sync pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Decode the manifest stored on a catalog entry.
pub fn manifest_of(plugin: &plugin::Model) -> Result<PluginManifest, AppError> {
    serde_json::from_value(plugin.manifest.clone()).map_err(|e| {
        AppError::Internal(format!("Corrupt manifest for plugin {}: {}", plugin.id, e))
    })
}

pub async fn find_plugin<C: ConnectionTrait>(
    conn: &C,
    plugin_id: i32,
) -> Result<plugin::Model, AppError> {
    plugin::Entity::find_by_id(plugin_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plugin {plugin_id} not found")))
}

pub async fn list_catalog<C: ConnectionTrait>(conn: &C) -> Result<Vec<plugin::Model>, DbErr> {
    plugin::Entity::find()
        .order_by_asc(plugin::Column::Name)
        .all(conn)
        .await
}

/// Add a validated manifest to the catalog. Names are unique.
#[instrument(skip(conn, manifest), fields(name = %manifest.name))]
pub async fn create_entry<C: ConnectionTrait>(
    conn: &C,
    manifest: &PluginManifest,
) -> Result<plugin::Model, AppError> {
    manifest.validate()?;

    let now = Utc::now();
    let entry = plugin::ActiveModel {
        name: Set(manifest.name.clone()),
        version: Set(manifest.version.clone()),
        author: Set(manifest.author.clone()),
        description: Set(manifest.description.clone()),
        manifest: Set(serde_json::to_value(manifest).map_err(|e| AppError::Internal(e.to_string()))?),
        install_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match entry.insert(conn).await {
        Ok(model) => Ok(model),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Err(
            AppError::Conflict(format!("Plugin '{}' is already catalogued", manifest.name)),
        ),
        Err(e) => Err(e.into()),
    }
}

/// Bring the catalog in line with the bundles found under `plugins_dir`.
///
/// New bundles are inserted; existing entries (matched by name) get the
/// bundle's version and manifest. Invalid manifests are skipped.
#[instrument(skip(conn))]
pub async fn sync_catalog<C: ConnectionTrait>(
    conn: &C,
    plugins_dir: &Path,
) -> Result<SyncReport, AppError> {
    let mut report = SyncReport::default();

    for bundle in PluginBundle::discover(plugins_dir)? {
        let manifest = bundle.manifest;
        if let Err(e) = manifest.validate() {
            warn!(dir = %bundle.root_dir.display(), "Skipping bundle: {}", e);
            report.skipped += 1;
            continue;
        }

        let existing = plugin::Entity::find()
            .filter(plugin::Column::Name.eq(manifest.name.as_str()))
            .one(conn)
            .await?;

        match existing {
            None => {
                create_entry(conn, &manifest).await?;
                report.added += 1;
            }
            Some(entry) => {
                let stored = manifest_of(&entry)?;
                if stored == manifest {
                    continue;
                }
                let mut active: plugin::ActiveModel = entry.into();
                active.version = Set(manifest.version.clone());
                active.author = Set(manifest.author.clone());
                active.description = Set(manifest.description.clone());
                active.manifest = Set(serde_json::to_value(&manifest)
                    .map_err(|e| AppError::Internal(e.to_string()))?);
                active.updated_at = Set(Utc::now());
                active.update(conn).await?;
                report.updated += 1;
            }
        }
    }

    info!(
        added = report.added,
        updated = report.updated,
        skipped = report.skipped,
        "Plugin catalog synced"
    );
    Ok(report)
}
