use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::activity::LogLevel;
use crate::context::PluginContext;

pub const INVOICES_READ: &str = "invoices:read";
pub const INVOICES_WRITE: &str = "invoices:write";
pub const EXPENSES_READ: &str = "expenses:read";
pub const EXPENSES_WRITE: &str = "expenses:write";
pub const PAYMENTS_READ: &str = "payments:read";
pub const PAYMENTS_WRITE: &str = "payments:write";
pub const CUSTOMERS_READ: &str = "customers:read";
pub const NOTIFICATIONS_SEND: &str = "notifications:send";
pub const STORAGE: &str = "storage";

/// Finance records reachable through the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Invoices,
    Expenses,
    Payments,
    Customers,
}

impl Resource {
    pub fn read_permission(&self) -> &'static str {
        match self {
            Resource::Invoices => INVOICES_READ,
            Resource::Expenses => EXPENSES_READ,
            Resource::Payments => PAYMENTS_READ,
            Resource::Customers => CUSTOMERS_READ,
        }
    }

    /// `None` for read-only resources.
    pub fn write_permission(&self) -> Option<&'static str> {
        match self {
            Resource::Invoices => Some(INVOICES_WRITE),
            Resource::Expenses => Some(EXPENSES_WRITE),
            Resource::Payments => Some(PAYMENTS_WRITE),
            Resource::Customers => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Resource::Invoices => "invoices",
            Resource::Expenses => "expenses",
            Resource::Payments => "payments",
            Resource::Customers => "customers",
        }
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoices" => Ok(Resource::Invoices),
            "expenses" => Ok(Resource::Expenses),
            "payments" => Ok(Resource::Payments),
            "customers" => Ok(Resource::Customers),
            other => Err(format!("unknown resource '{other}'")),
        }
    }
}

/// Capabilities a running plugin can call back into, scoped to one
/// installation. Implementations enforce the installation's permissions.
#[async_trait]
pub trait HostApi: Send + Sync {
    fn context(&self) -> &PluginContext;

    async fn list(&self, resource: Resource, filter: &Value) -> anyhow::Result<Vec<Value>>;

    async fn create(&self, resource: Resource, data: &Value) -> anyhow::Result<Value>;

    async fn update(&self, resource: Resource, id: &str, data: &Value) -> anyhow::Result<Value>;

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;

    async fn send_slack(&self, channel: &str, message: &str) -> anyhow::Result<()>;

    async fn storage_get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn storage_set(&self, key: &str, data: Value) -> anyhow::Result<()>;

    /// Record an entry in the installation's activity log. Never fails.
    async fn log(&self, level: LogLevel, message: &str, context: Value);
}

/// Shared handle to the host of one installation.
pub type HostHandle = Arc<dyn HostApi>;
