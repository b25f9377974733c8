use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{Level, info};

use marketplace::config::AppConfig;
use marketplace::database::init_db;
use marketplace::services::host::{PluginHost, PluginLoader};
use marketplace::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = init_db(&config.database)
        .await
        .context("Failed to initialize database")?;

    let loader = PluginLoader::new(&config.plugin);
    let plugins = Arc::new(PluginHost::new(db.clone(), &config.plugin, loader));
    plugins.restore(&db).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        db,
        config,
        plugins,
    };
    let app = marketplace::build_router(state);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
