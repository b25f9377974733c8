use std::collections::HashMap;

use chrono::Utc;
use plugin_core::manifest::{PluginManifest, SettingType};
use sea_orm::*;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::entity::{plugin_installation, plugin_setting};
use crate::error::AppError;
use crate::services::installation::find_owned_installation;

/// Per-installation settings rows, typed by the manifest that seeded them.
pub struct SettingsService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> SettingsService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// One row per manifest setting definition.
    pub async fn seed(&self, installation_id: i32, manifest: &PluginManifest) -> Result<(), DbErr> {
        if manifest.settings.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let rows = manifest.settings.iter().map(|def| plugin_setting::ActiveModel {
            installation_id: Set(installation_id),
            setting_key: Set(def.key.clone()),
            setting_value: Set(def.seed_value()),
            setting_type: Set(def.setting_type.to_string()),
            is_required: Set(def.required),
            default_value: Set(def.default.as_ref().map(Value::to_string)),
            description: Set(def.description.clone()),
            updated_at: Set(now),
            ..Default::default()
        });
        plugin_setting::Entity::insert_many(rows)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    pub async fn list(&self, installation_id: i32) -> Result<Vec<plugin_setting::Model>, DbErr> {
        plugin_setting::Entity::find()
            .filter(plugin_setting::Column::InstallationId.eq(installation_id))
            .order_by_asc(plugin_setting::Column::Id)
            .all(self.conn)
            .await
    }

    /// Owner-scoped listing.
    pub async fn get_settings(
        &self,
        installation_id: i32,
        user_id: &str,
    ) -> Result<Vec<plugin_setting::Model>, AppError> {
        find_owned_installation(self.conn, installation_id, user_id).await?;
        Ok(self.list(installation_id).await?)
    }

    /// Settings as a key to value map, the shape plugins see.
    pub async fn materialize(&self, installation_id: i32) -> Result<Map<String, Value>, DbErr> {
        Ok(self
            .list(installation_id)
            .await?
            .iter()
            .map(|row| (row.setting_key.clone(), decode_value(row)))
            .collect())
    }
}

impl<'a, C: ConnectionTrait + TransactionTrait> SettingsService<'a, C> {
    /// Validate and write `values`, then refresh the installation's snapshot.
    ///
    /// Every key is checked before anything is written, so a single bad
    /// value leaves all rows untouched. The row writes and the snapshot
    /// commit together.
    #[instrument(skip(self, values))]
    pub async fn update_plugin_settings(
        &self,
        installation_id: i32,
        user_id: &str,
        values: &Map<String, Value>,
    ) -> Result<Map<String, Value>, AppError> {
        let installation = find_owned_installation(self.conn, installation_id, user_id).await?;
        let rows: HashMap<String, plugin_setting::Model> = self
            .list(installation_id)
            .await?
            .into_iter()
            .map(|row| (row.setting_key.clone(), row))
            .collect();

        let mut pending = Vec::with_capacity(values.len());
        for (key, value) in values {
            let row = rows
                .get(key)
                .ok_or_else(|| AppError::Validation(format!("Unknown setting '{key}'")))?;
            check_value(row, value)?;
            pending.push((row.clone(), value.to_string()));
        }

        let now = Utc::now();
        let txn = self.conn.begin().await?;
        for (row, text) in pending {
            let mut active: plugin_setting::ActiveModel = row.into();
            active.setting_value = Set(text);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        let snapshot = SettingsService::new(&txn).materialize(installation_id).await?;
        let mut active: plugin_installation::ActiveModel = installation.into();
        active.settings = Set(Value::Object(snapshot.clone()));
        active.updated_at = Set(now);
        active.update(&txn).await?;
        txn.commit().await?;

        Ok(snapshot)
    }
}

fn check_value(row: &plugin_setting::Model, value: &Value) -> Result<(), AppError> {
    if value.is_null() {
        if row.is_required {
            return Err(AppError::Validation(format!(
                "Setting '{}' is required",
                row.setting_key
            )));
        }
        return Ok(());
    }
    let declared: SettingType = row.setting_type.parse()?;
    if !declared.check(value) {
        return Err(AppError::Validation(format!(
            "Setting '{}' must be a {}",
            row.setting_key, declared
        )));
    }
    Ok(())
}

/// Decode a stored value. An empty string is the "never set" marker.
pub fn decode_value(row: &plugin_setting::Model) -> Value {
    if row.setting_value.is_empty() {
        return row
            .setting_type
            .parse::<SettingType>()
            .map(|declared| declared.unset_value())
            .unwrap_or(Value::Null);
    }
    serde_json::from_str(&row.setting_value)
        .unwrap_or_else(|_| Value::String(row.setting_value.clone()))
}
