use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use plugin_core::activity::{ActivityEntry, LogLevel};
use plugin_core::{HostApi, PluginContext};
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use crate::entity::{plugin_installation, plugin_storage};
use crate::error::AppError;
use crate::services::host::PluginHost;
use crate::services::installation::find_owned_installation;
use crate::services::settings::SettingsService;

pub use plugin_core::host_api::{
    CUSTOMERS_READ, EXPENSES_READ, EXPENSES_WRITE, INVOICES_READ, INVOICES_WRITE,
    NOTIFICATIONS_SEND, PAYMENTS_READ, PAYMENTS_WRITE, Resource, STORAGE,
};

/// The finance services plugins read from and write to.
#[async_trait]
pub trait FinanceGateway: Send + Sync {
    async fn list(
        &self,
        ctx: &PluginContext,
        resource: Resource,
        filter: &Value,
    ) -> anyhow::Result<Vec<Value>>;

    async fn create(&self, ctx: &PluginContext, resource: Resource, data: &Value)
    -> anyhow::Result<Value>;

    async fn update(
        &self,
        ctx: &PluginContext,
        resource: Resource,
        id: &str,
        data: &Value,
    ) -> anyhow::Result<Value>;
}

/// Gateway used when no finance backend is wired in: lists are empty and
/// writes echo their input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFinanceGateway;

#[async_trait]
impl FinanceGateway for NullFinanceGateway {
    async fn list(&self, _: &PluginContext, _: Resource, _: &Value) -> anyhow::Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn create(&self, _: &PluginContext, _: Resource, data: &Value) -> anyhow::Result<Value> {
        Ok(data.clone())
    }

    async fn update(
        &self,
        _: &PluginContext,
        _: Resource,
        id: &str,
        data: &Value,
    ) -> anyhow::Result<Value> {
        let mut updated = data.clone();
        if let Some(obj) = updated.as_object_mut() {
            obj.insert("id".into(), Value::String(id.to_string()));
        }
        Ok(updated)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(
        &self,
        ctx: &PluginContext,
        to: &str,
        subject: &str,
        body: &str,
    ) -> anyhow::Result<()>;

    async fn send_slack(&self, ctx: &PluginContext, channel: &str, message: &str)
    -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_email(
        &self,
        ctx: &PluginContext,
        to: &str,
        subject: &str,
        _body: &str,
    ) -> anyhow::Result<()> {
        info!(plugin_id = ctx.plugin_id, to, subject, "Email notification");
        Ok(())
    }

    async fn send_slack(
        &self,
        ctx: &PluginContext,
        channel: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        info!(plugin_id = ctx.plugin_id, channel, message, "Slack notification");
        Ok(())
    }
}

/// Context a plugin sees when acting for `installation`.
pub async fn build_context<C: ConnectionTrait>(
    conn: &C,
    installation: &plugin_installation::Model,
) -> Result<PluginContext, DbErr> {
    Ok(PluginContext {
        user_id: installation.user_id.clone(),
        organization_id: installation.organization_id.clone(),
        plugin_id: installation.plugin_id,
        installation_id: installation.id,
        settings: SettingsService::new(conn).materialize(installation.id).await?,
        permissions: installation.permission_list(),
    })
}

/// Capability surface handed to a plugin for one installation.
///
/// Every call is checked against the permissions copied onto the
/// installation when it was created.
pub struct PluginApi {
    db: DatabaseConnection,
    host: Arc<PluginHost>,
    ctx: PluginContext,
}

impl PluginApi {
    pub async fn for_installation(
        db: DatabaseConnection,
        host: Arc<PluginHost>,
        installation_id: i32,
        user_id: &str,
    ) -> Result<Self, AppError> {
        let installation = find_owned_installation(&db, installation_id, user_id).await?;
        Self::from_installation(db, host, &installation).await
    }

    /// Facade for an installation already loaded by the caller.
    pub async fn from_installation(
        db: DatabaseConnection,
        host: Arc<PluginHost>,
        installation: &plugin_installation::Model,
    ) -> Result<Self, AppError> {
        let ctx = build_context(&db, installation).await?;
        Ok(Self { db, host, ctx })
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    fn require(&self, permission: &str) -> Result<(), AppError> {
        if self.ctx.has_permission(permission) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!(
                "Plugin {} lacks '{permission}'",
                self.ctx.plugin_id
            )))
        }
    }

    async fn list(&self, resource: Resource, filter: &Value) -> Result<Vec<Value>, AppError> {
        self.require(resource.read_permission())?;
        self.host
            .finance()
            .list(&self.ctx, resource, filter)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read {resource}: {e}")))
    }

    async fn create(&self, resource: Resource, data: &Value) -> Result<Value, AppError> {
        self.require_write(resource)?;
        self.host
            .finance()
            .create(&self.ctx, resource, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create {resource}: {e}")))
    }

    async fn update(&self, resource: Resource, id: &str, data: &Value) -> Result<Value, AppError> {
        self.require_write(resource)?;
        self.host
            .finance()
            .update(&self.ctx, resource, id, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to update {resource} {id}: {e}")))
    }

    fn require_write(&self, resource: Resource) -> Result<(), AppError> {
        match resource.write_permission() {
            Some(permission) => self.require(permission),
            None => Err(AppError::PermissionDenied(format!("{resource} are read-only"))),
        }
    }

    pub async fn get_invoices(&self, filter: &Value) -> Result<Vec<Value>, AppError> {
        self.list(Resource::Invoices, filter).await
    }

    pub async fn get_expenses(&self, filter: &Value) -> Result<Vec<Value>, AppError> {
        self.list(Resource::Expenses, filter).await
    }

    pub async fn get_payments(&self, filter: &Value) -> Result<Vec<Value>, AppError> {
        self.list(Resource::Payments, filter).await
    }

    pub async fn get_customers(&self, filter: &Value) -> Result<Vec<Value>, AppError> {
        self.list(Resource::Customers, filter).await
    }

    pub async fn create_invoice(&self, data: &Value) -> Result<Value, AppError> {
        self.create(Resource::Invoices, data).await
    }

    pub async fn update_invoice(&self, id: &str, data: &Value) -> Result<Value, AppError> {
        self.update(Resource::Invoices, id, data).await
    }

    pub async fn create_expense(&self, data: &Value) -> Result<Value, AppError> {
        self.create(Resource::Expenses, data).await
    }

    pub async fn create_payment(&self, data: &Value) -> Result<Value, AppError> {
        self.create(Resource::Payments, data).await
    }

    pub async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        self.require(NOTIFICATIONS_SEND)?;
        self.host
            .notifier()
            .send_email(&self.ctx, to, subject, body)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send email: {e}")))
    }

    pub async fn send_slack(&self, channel: &str, message: &str) -> Result<(), AppError> {
        self.require(NOTIFICATIONS_SEND)?;
        self.host
            .notifier()
            .send_slack(&self.ctx, channel, message)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to post to Slack: {e}")))
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.ctx.setting(key)
    }

    /// Write settings for this installation and refresh the context.
    pub async fn update_settings(&mut self, values: &Map<String, Value>) -> Result<(), AppError> {
        self.ctx.settings = SettingsService::new(&self.db)
            .update_plugin_settings(self.ctx.installation_id, &self.ctx.user_id, values)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(installation_id = self.ctx.installation_id))]
    pub async fn storage_get(&self, key: &str) -> Result<Option<Value>, AppError> {
        self.require(STORAGE)?;
        let row = plugin_storage::Entity::find_by_id((self.ctx.installation_id, key.to_string()))
            .one(&self.db)
            .await?;
        Ok(row.map(|r| r.data))
    }

    #[instrument(skip(self, data), fields(installation_id = self.ctx.installation_id))]
    pub async fn storage_set(&self, key: &str, data: Value) -> Result<(), AppError> {
        self.require(STORAGE)?;
        let row = plugin_storage::ActiveModel {
            installation_id: Set(self.ctx.installation_id),
            key: Set(key.to_string()),
            data: Set(data),
            updated_at: Set(Utc::now()),
        };
        plugin_storage::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    plugin_storage::Column::InstallationId,
                    plugin_storage::Column::Key,
                ])
                .update_columns([plugin_storage::Column::Data, plugin_storage::Column::UpdatedAt])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        debug!(key, "Plugin storage updated");
        Ok(())
    }

    /// Logger bound to this plugin and installation.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>, context: Option<Value>) {
        let entry = ActivityEntry::for_installation(self.ctx.plugin_id, &self.ctx, level, message)
            .with_context(context.unwrap_or_else(|| json!({})));
        self.host.record(entry).await;
    }
}

/// What hooks see: the facade with errors flattened for plugin code.
#[async_trait]
impl HostApi for PluginApi {
    fn context(&self) -> &PluginContext {
        &self.ctx
    }

    async fn list(&self, resource: Resource, filter: &Value) -> anyhow::Result<Vec<Value>> {
        Ok(PluginApi::list(self, resource, filter).await?)
    }

    async fn create(&self, resource: Resource, data: &Value) -> anyhow::Result<Value> {
        Ok(PluginApi::create(self, resource, data).await?)
    }

    async fn update(&self, resource: Resource, id: &str, data: &Value) -> anyhow::Result<Value> {
        Ok(PluginApi::update(self, resource, id, data).await?)
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        Ok(PluginApi::send_email(self, to, subject, body).await?)
    }

    async fn send_slack(&self, channel: &str, message: &str) -> anyhow::Result<()> {
        Ok(PluginApi::send_slack(self, channel, message).await?)
    }

    async fn storage_get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(PluginApi::storage_get(self, key).await?)
    }

    async fn storage_set(&self, key: &str, data: Value) -> anyhow::Result<()> {
        Ok(PluginApi::storage_set(self, key, data).await?)
    }

    async fn log(&self, level: LogLevel, message: &str, context: Value) {
        PluginApi::log(self, level, message, Some(context)).await;
    }
}
