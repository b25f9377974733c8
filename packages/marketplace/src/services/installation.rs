use chrono::Utc;
use plugin_core::activity::LogLevel;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::*;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::entity::{plugin, plugin_installation, plugin_log, plugin_setting, plugin_storage};
use crate::error::AppError;
use crate::services::activity::installation_entry;
use crate::services::catalog::{find_plugin, manifest_of};
use crate::services::host::PluginHost;
use crate::services::settings::SettingsService;

/// Owner-scoped lookup. Another user's installation is reported as missing.
pub async fn find_owned_installation<C: ConnectionTrait>(
    conn: &C,
    installation_id: i32,
    user_id: &str,
) -> Result<plugin_installation::Model, AppError> {
    plugin_installation::Entity::find_by_id(installation_id)
        .filter(plugin_installation::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Installation {installation_id} not found")))
}

/// An installation together with its catalog name.
#[derive(Debug, Clone, Serialize)]
pub struct UserPlugin {
    pub installation: plugin_installation::Model,
    pub plugin_name: String,
}

pub struct InstallationService<'a> {
    db: &'a DatabaseConnection,
    host: &'a PluginHost,
}

impl<'a> InstallationService<'a> {
    pub fn new(db: &'a DatabaseConnection, host: &'a PluginHost) -> Self {
        Self { db, host }
    }

    /// Install a catalog plugin for a user and return the installation id.
    #[instrument(skip(self))]
    pub async fn install_plugin(
        &self,
        plugin_id: i32,
        user_id: &str,
        organization_id: Option<String>,
    ) -> Result<i32, AppError> {
        let catalog_entry = find_plugin(self.db, plugin_id).await?;
        let manifest = manifest_of(&catalog_entry)?;
        manifest.validate()?;

        let existing = plugin_installation::Entity::find()
            .filter(plugin_installation::Column::PluginId.eq(plugin_id))
            .filter(plugin_installation::Column::UserId.eq(user_id))
            .count(self.db)
            .await?;
        if existing > 0 {
            return Err(already_installed(&manifest.name));
        }

        let defaults: serde_json::Map<String, Value> = manifest
            .settings
            .iter()
            .map(|def| (def.key.clone(), def.initial_value()))
            .collect();

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let row = plugin_installation::ActiveModel {
            plugin_id: Set(plugin_id),
            user_id: Set(user_id.to_string()),
            organization_id: Set(organization_id),
            version: Set(catalog_entry.version.clone()),
            is_active: Set(true),
            is_enabled: Set(true),
            settings: Set(Value::Object(defaults)),
            permissions: Set(json!(manifest.permissions)),
            installed_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let installation = match row.insert(&txn).await {
            Ok(model) => model,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(already_installed(&manifest.name));
            }
            Err(e) => return Err(e.into()),
        };

        plugin::Entity::update_many()
            .col_expr(
                plugin::Column::InstallCount,
                Expr::col(plugin::Column::InstallCount).add(1),
            )
            .filter(plugin::Column::Id.eq(plugin_id))
            .exec(&txn)
            .await?;

        SettingsService::new(&txn)
            .seed(installation.id, &manifest)
            .await?;

        txn.commit().await?;

        self.host
            .record(installation_entry(
                &installation,
                LogLevel::Info,
                format!("Plugin {manifest} installed"),
            ))
            .await;

        if let Err(e) = self.host.ensure_registered(&catalog_entry).await {
            warn!(plugin_id, "Installed plugin could not be registered: {}", e);
        }

        Ok(installation.id)
    }

    /// Remove an installation with its settings, logs and storage.
    #[instrument(skip(self))]
    pub async fn uninstall_plugin(&self, installation_id: i32, user_id: &str) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let installation = find_owned_installation(&txn, installation_id, user_id).await?;
        let plugin_id = installation.plugin_id;

        if let Err(e) = remove_installation(&txn, installation).await {
            if let Err(rollback) = txn.rollback().await {
                warn!(plugin_id, "Rollback failed: {}", rollback);
            }
            self.host
                .log_plugin(
                    plugin_id,
                    None,
                    LogLevel::Error,
                    format!("Failed to uninstall installation {installation_id}"),
                    json!({ "error": e.to_string() }),
                )
                .await;
            return Err(e.into());
        }
        txn.commit().await?;

        self.host
            .log_plugin(
                plugin_id,
                None,
                LogLevel::Info,
                format!("Installation {installation_id} uninstalled"),
                json!({ "user_id": user_id }),
            )
            .await;

        self.host.release_if_unused(self.db, plugin_id).await?;
        Ok(())
    }

    /// Set the active and enabled flags together. Repeating a toggle is a no-op.
    /// Activating registers the plugin if this process has not yet.
    #[instrument(skip(self))]
    pub async fn toggle_plugin(
        &self,
        installation_id: i32,
        user_id: &str,
        is_active: bool,
    ) -> Result<plugin_installation::Model, AppError> {
        let installation = find_owned_installation(self.db, installation_id, user_id).await?;
        if installation.is_active == is_active && installation.is_enabled == is_active {
            return Ok(installation);
        }

        let mut active: plugin_installation::ActiveModel = installation.into();
        active.is_active = Set(is_active);
        active.is_enabled = Set(is_active);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db).await?;

        let state = if is_active { "enabled" } else { "disabled" };
        self.host
            .record(installation_entry(
                &updated,
                LogLevel::Info,
                format!("Plugin {state}"),
            ))
            .await;

        if is_active {
            let registered = match find_plugin(self.db, updated.plugin_id).await {
                Ok(entry) => self.host.ensure_registered(&entry).await,
                Err(e) => Err(e),
            };
            if let Err(e) = registered {
                warn!(
                    plugin_id = updated.plugin_id,
                    "Reactivated plugin could not be registered: {}", e
                );
            }
        }
        Ok(updated)
    }

    pub async fn get_user_plugins(&self, user_id: &str) -> Result<Vec<UserPlugin>, AppError> {
        let rows = plugin_installation::Entity::find()
            .filter(plugin_installation::Column::UserId.eq(user_id))
            .order_by_asc(plugin_installation::Column::Id)
            .all(self.db)
            .await?;

        let plugin_ids: Vec<i32> = rows.iter().map(|r| r.plugin_id).collect();
        let names: std::collections::HashMap<i32, String> = plugin::Entity::find()
            .filter(plugin::Column::Id.is_in(plugin_ids))
            .all(self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        Ok(rows
            .into_iter()
            .map(|installation| UserPlugin {
                plugin_name: names
                    .get(&installation.plugin_id)
                    .cloned()
                    .unwrap_or_default(),
                installation,
            })
            .collect())
    }

    pub async fn get_by_id(
        &self,
        installation_id: i32,
        user_id: &str,
    ) -> Result<plugin_installation::Model, AppError> {
        find_owned_installation(self.db, installation_id, user_id).await
    }
}

fn already_installed(name: &str) -> AppError {
    AppError::Conflict(format!("Plugin '{name}' is already installed"))
}

async fn remove_installation<C: ConnectionTrait>(
    conn: &C,
    installation: plugin_installation::Model,
) -> Result<(), DbErr> {
    let installation_id = installation.id;
    let plugin_id = installation.plugin_id;

    let mut active: plugin_installation::ActiveModel = installation.into();
    active.is_active = Set(false);
    active.is_enabled = Set(false);
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;

    plugin::Entity::update_many()
        .col_expr(
            plugin::Column::InstallCount,
            Expr::col(plugin::Column::InstallCount).sub(1),
        )
        .filter(plugin::Column::Id.eq(plugin_id))
        .filter(plugin::Column::InstallCount.gt(0))
        .exec(conn)
        .await?;

    plugin_setting::Entity::delete_many()
        .filter(plugin_setting::Column::InstallationId.eq(installation_id))
        .exec(conn)
        .await?;
    plugin_log::Entity::delete_many()
        .filter(plugin_log::Column::InstallationId.eq(installation_id))
        .exec(conn)
        .await?;
    plugin_storage::Entity::delete_many()
        .filter(plugin_storage::Column::InstallationId.eq(installation_id))
        .exec(conn)
        .await?;
    plugin_installation::Entity::delete_by_id(installation_id)
        .exec(conn)
        .await?;
    Ok(())
}
