use async_trait::async_trait;
use chrono::Utc;
use plugin_core::activity::{self, ActivityEntry, ActivitySink, LogLevel};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::entity::{plugin_installation, plugin_log};
use crate::error::AppError;
use crate::services::installation::find_owned_installation;

pub const DEFAULT_LOG_LIMIT: u64 = 50;
pub const MAX_LOG_LIMIT: u64 = 500;

/// Database-backed activity log. Every entry is mirrored to `tracing`;
/// a failed insert is reported and dropped.
pub struct ActivityLog {
    db: DatabaseConnection,
}

impl ActivityLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn log_plugin(
        &self,
        plugin_id: i32,
        installation_id: Option<i32>,
        level: LogLevel,
        message: impl Into<String>,
        context: Value,
    ) {
        let mut entry = ActivityEntry::system(plugin_id, level, message).with_context(context);
        entry.installation_id = installation_id;
        self.record(entry).await;
    }
}

/// Entry attributed to the owner of `installation`.
pub fn installation_entry(
    installation: &plugin_installation::Model,
    level: LogLevel,
    message: impl Into<String>,
) -> ActivityEntry {
    let mut entry = ActivityEntry::system(installation.plugin_id, level, message);
    entry.installation_id = Some(installation.id);
    entry.user_id = installation.user_id.clone();
    entry
}

#[async_trait]
impl ActivitySink for ActivityLog {
    async fn record(&self, entry: ActivityEntry) {
        activity::emit(&entry);

        let context = match entry.context {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let model = plugin_log::ActiveModel {
            plugin_id: Set(entry.plugin_id),
            installation_id: Set(entry.installation_id),
            user_id: Set(entry.user_id),
            level: Set(entry.level.to_string()),
            message: Set(entry.message),
            context: Set(context),
            execution_time_ms: Set(entry.execution_time_ms),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        if let Err(e) = plugin_log::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
        {
            tracing::error!(plugin_id = entry.plugin_id, "Failed to write plugin log: {}", e);
        }
    }
}

/// Newest-first log entries of an installation owned by `user_id`.
#[instrument(skip(conn))]
pub async fn get_plugin_logs<C: ConnectionTrait>(
    conn: &C,
    installation_id: i32,
    user_id: &str,
    limit: Option<u64>,
) -> Result<Vec<plugin_log::Model>, AppError> {
    find_owned_installation(conn, installation_id, user_id).await?;

    let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let logs = plugin_log::Entity::find()
        .filter(plugin_log::Column::InstallationId.eq(installation_id))
        .order_by_desc(plugin_log::Column::CreatedAt)
        .order_by_desc(plugin_log::Column::Id)
        .limit(limit)
        .all(conn)
        .await?;
    Ok(logs)
}
