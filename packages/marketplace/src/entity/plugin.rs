use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Marketplace catalog entry.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub version: String,
    pub author: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,

    /// Full manifest as submitted: hooks, permissions, settings, dependencies.
    #[sea_orm(column_type = "JsonBinary")]
    pub manifest: Json,

    /// Maintained with atomic increments; never negative.
    pub install_count: i32,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
