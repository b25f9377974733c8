use std::time::Duration;

use sea_orm::sea_query::{
    Index, IndexCreateStatement, MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder,
};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{plugin_installation, plugin_log, plugin_setting};

pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(60))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("marketplace::entity::*")
        .sync(&db)
        .await?;
    ensure_indexes(&db).await?;

    Ok(db)
}

/// Create the composite indexes schema-sync cannot express.
///
/// The unique indexes back the one-installation-per-user and
/// one-row-per-setting-key invariants, so failing to create them is fatal.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let unique_install = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_installation_plugin_user")
        .table(plugin_installation::Entity)
        .col(plugin_installation::Column::PluginId)
        .col(plugin_installation::Column::UserId)
        .to_owned();
    create_index(db, unique_install).await?;

    let unique_setting = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_setting_installation_key")
        .table(plugin_setting::Entity)
        .col(plugin_setting::Column::InstallationId)
        .col(plugin_setting::Column::SettingKey)
        .to_owned();
    create_index(db, unique_setting).await?;

    // SELECT ... FROM plugin_log WHERE installation_id = ? ORDER BY created_at DESC
    let log_lookup = Index::create()
        .if_not_exists()
        .name("idx_log_installation_created")
        .table(plugin_log::Entity)
        .col(plugin_log::Column::InstallationId)
        .col(plugin_log::Column::CreatedAt)
        .to_owned();
    if let Err(e) = create_index(db, log_lookup).await {
        tracing::warn!("Failed to create index idx_log_installation_created: {}", e);
    }

    Ok(())
}

async fn create_index(db: &DatabaseConnection, stmt: IndexCreateStatement) -> Result<(), DbErr> {
    let sql = match db.get_database_backend() {
        DbBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(MysqlQueryBuilder),
    };
    db.execute_unprepared(&sql).await?;
    info!("Ensured index exists: {}", sql);
    Ok(())
}
