use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use plugin_core::{HostHandle, Plugin, PluginManifest};
use reqwest::Client;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{Value, json};
use tempfile::TempDir;

use marketplace::config::{AppConfig, AuthConfig, CorsConfig, DatabaseConfig, ServerConfig};
use marketplace::entity::plugin;
use marketplace::services::catalog::create_entry;
use marketplace::services::host::{PluginHost, PluginLoader};
use marketplace::state::AppState;
use marketplace::utils::jwt::{self, Claims};

pub const JWT_SECRET: &str = "test-secret-for-integration-tests";
pub const SLACK_MAIN: &str = "slack-notifier.js";
pub const FAILING_MAIN: &str = "always-fails.js";
pub const LEDGER_MAIN: &str = "payment-ledger.js";

pub mod routes {
    pub const PLUGINS: &str = "/api/v1/plugins";
    pub const INSTALLATIONS: &str = "/api/v1/installations";
    pub const CATALOG_SYNC: &str = "/api/v1/admin/catalog/sync";

    pub fn install(plugin_id: i32) -> String {
        format!("/api/v1/plugins/{plugin_id}/install")
    }

    pub fn installation(id: i32) -> String {
        format!("/api/v1/installations/{id}")
    }

    pub fn settings(id: i32) -> String {
        format!("/api/v1/installations/{id}/settings")
    }

    pub fn logs(id: i32) -> String {
        format!("/api/v1/installations/{id}/logs")
    }

    pub fn hook(name: &str) -> String {
        format!("/api/v1/hooks/{name}")
    }
}

/// Posts payment events to a channel taken from its settings.
pub struct SlackNotifier;

#[async_trait]
impl Plugin for SlackNotifier {
    fn handles(&self, hook: &str) -> bool {
        hook == "onPaymentReceived"
    }

    async fn on_hook(&self, _hook: &str, data: &Value, host: HostHandle) -> anyhow::Result<Value> {
        Ok(json!({
            "notified": host.context().setting("channel").cloned().unwrap_or(Value::Null),
            "amount": data["amount"],
        }))
    }
}

pub struct AlwaysFails;

#[async_trait]
impl Plugin for AlwaysFails {
    fn handles(&self, _hook: &str) -> bool {
        true
    }

    async fn on_hook(&self, _: &str, _: &Value, _: HostHandle) -> anyhow::Result<Value> {
        Err(anyhow!("upstream rejected the event"))
    }
}

/// Keeps a running payment total in plugin storage.
pub struct PaymentLedger;

#[async_trait]
impl Plugin for PaymentLedger {
    fn handles(&self, hook: &str) -> bool {
        hook == "onPaymentReceived"
    }

    async fn on_hook(&self, _: &str, data: &Value, host: HostHandle) -> anyhow::Result<Value> {
        let total = host
            .storage_get("total")
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            + data["amount"].as_i64().unwrap_or(0);
        host.storage_set("total", json!(total)).await?;
        Ok(json!({ "total": total }))
    }
}

pub fn slack_manifest() -> Value {
    json!({
        "name": "Slack Notifier",
        "version": "1.0.0",
        "description": "Posts payment events to Slack",
        "author": "Acme",
        "main": SLACK_MAIN,
        "hooks": ["onPaymentReceived"],
        "permissions": ["notifications:send", "storage", "invoices:read"],
        "settings": [
            {"key": "webhookUrl", "type": "string", "required": true},
            {"key": "channel", "type": "string", "default": "#general"},
            {"key": "retries", "type": "number", "default": 3}
        ]
    })
}

pub fn failing_manifest() -> Value {
    json!({
        "name": "Flaky Auditor",
        "version": "0.1.0",
        "description": "Always fails",
        "author": "Acme",
        "main": FAILING_MAIN,
        "hooks": ["onPaymentReceived"]
    })
}

pub fn ledger_manifest(permissions: &[&str]) -> Value {
    json!({
        "name": "Payment Ledger",
        "version": "1.0.0",
        "description": "Totals payments",
        "author": "Acme",
        "main": LEDGER_MAIN,
        "hooks": ["onPaymentReceived"],
        "permissions": permissions
    })
}

/// A manifest with no implementation behind it.
pub fn inert_manifest(name: &str) -> Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "description": "No implementation",
        "author": "Acme",
        "main": "missing.js"
    })
}

pub struct TestResponse {
    pub status: u16,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, body }
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub host: Arc<PluginHost>,
    pub config: AppConfig,
    pub plugins_dir: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let plugins_dir = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins_dir).expect("Failed to create plugins dir");

        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let mut database = DatabaseConfig::new(db_url);
        database.max_connections = 5;

        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database,
            auth: AuthConfig {
                jwt_secret: JWT_SECRET.to_string(),
            },
            plugin: plugin_core::PluginConfig {
                plugins_dir: plugins_dir.clone(),
                ..Default::default()
            },
        };

        let db = marketplace::database::init_db(&config.database)
            .await
            .expect("Failed to initialize test database");
        let host = Arc::new(Self::host(&db, &config));

        let state = AppState {
            db: db.clone(),
            config: config.clone(),
            plugins: host.clone(),
        };
        let app = marketplace::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            host,
            config,
            plugins_dir,
            _dir: dir,
        }
    }

    /// A fresh host over the same database, as after a process restart.
    pub fn host(db: &DatabaseConnection, config: &AppConfig) -> PluginHost {
        let loader = PluginLoader::new(&config.plugin)
            .with_native(SLACK_MAIN, || Arc::new(SlackNotifier))
            .with_native(FAILING_MAIN, || Arc::new(AlwaysFails))
            .with_native(LEDGER_MAIN, || Arc::new(PaymentLedger));
        PluginHost::new(db.clone(), &config.plugin, loader)
    }

    pub fn token(&self, user_id: &str, permissions: &[&str]) -> String {
        let claims = Claims::new(user_id, None, permissions, chrono::Duration::hours(1));
        jwt::sign(JWT_SECRET, &claims).expect("Failed to sign token")
    }

    pub async fn catalog(&self, manifest: Value) -> plugin::Model {
        let manifest: PluginManifest = serde_json::from_value(manifest).expect("Bad manifest");
        create_entry(&self.db, &manifest)
            .await
            .expect("Failed to catalog plugin")
    }

    /// Insert a catalog row verbatim, bypassing manifest validation.
    pub async fn catalog_raw(&self, id: i32, manifest: Value) -> plugin::Model {
        let now = Utc::now();
        plugin::ActiveModel {
            id: Set(id),
            name: Set(manifest["name"].as_str().unwrap_or("unnamed").to_string()),
            version: Set(manifest["version"].as_str().unwrap_or("").to_string()),
            author: Set(manifest["author"].as_str().unwrap_or("").to_string()),
            description: Set(manifest["description"].as_str().unwrap_or("").to_string()),
            manifest: Set(manifest),
            install_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert catalog row")
    }

    /// Install through the API and return the installation id.
    pub async fn install(&self, plugin_id: i32, token: &str) -> i32 {
        let res = self.post_with_token(&routes::install(plugin_id), &json!({}), token).await;
        assert_eq!(res.status, 201, "install failed: {}", res.body);
        res.body["installation_id"].as_i64().unwrap() as i32
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");
        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");
        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");
        TestResponse::from_response(res).await
    }

    pub async fn patch_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PATCH request");
        TestResponse::from_response(res).await
    }

    pub async fn put_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");
        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");
        TestResponse::from_response(res).await
    }
}
