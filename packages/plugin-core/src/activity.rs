use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::PluginId;
use crate::context::PluginContext;

/// User id recorded for events raised by the host rather than a user.
pub const SYSTEM_USER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// One plugin lifecycle or hook-execution event.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub plugin_id: PluginId,
    /// `None` for process-level events such as registration.
    pub installation_id: Option<i32>,
    pub user_id: String,
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
    pub execution_time_ms: Option<i64>,
}

impl ActivityEntry {
    pub fn system(plugin_id: PluginId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            plugin_id,
            installation_id: None,
            user_id: SYSTEM_USER.to_string(),
            level,
            message: message.into(),
            context: Value::Object(Map::new()),
            execution_time_ms: None,
        }
    }

    pub fn for_installation(
        plugin_id: PluginId,
        ctx: &PluginContext,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            plugin_id,
            installation_id: Some(ctx.installation_id),
            user_id: ctx.user_id.clone(),
            level,
            message: message.into(),
            context: Value::Object(Map::new()),
            execution_time_ms: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time_ms = Some(elapsed.as_millis() as i64);
        self
    }
}

/// Destination for activity entries.
///
/// Recording is best-effort: implementations must swallow their own failures
/// so that logging never propagates into business logic.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, entry: ActivityEntry);
}

/// Sink that only emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ActivitySink for TracingSink {
    async fn record(&self, entry: ActivityEntry) {
        emit(&entry);
    }
}

/// Mirror an entry to `tracing` at its own level.
pub fn emit(entry: &ActivityEntry) {
    let plugin_id = entry.plugin_id;
    let installation_id = entry.installation_id;
    match entry.level {
        LogLevel::Debug => {
            tracing::debug!(plugin_id, ?installation_id, context = %entry.context, "{}", entry.message)
        }
        LogLevel::Info => {
            tracing::info!(plugin_id, ?installation_id, context = %entry.context, "{}", entry.message)
        }
        LogLevel::Warn => {
            tracing::warn!(plugin_id, ?installation_id, context = %entry.context, "{}", entry.message)
        }
        LogLevel::Error => {
            tracing::error!(plugin_id, ?installation_id, context = %entry.context, "{}", entry.message)
        }
    }
}
