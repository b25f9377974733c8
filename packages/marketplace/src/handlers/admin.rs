use axum::Json;
use axum::extract::State;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::services::catalog::{SyncReport, sync_catalog};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/catalog/sync",
    tag = "Admin",
    operation_id = "syncCatalog",
    summary = "Sync the catalog with plugin bundles on disk",
    description = "Scans the configured plugins directory for `plugin.toml` bundles. New bundles are catalogued and existing entries refreshed. Requires `plugin:manage` permission.",
    responses(
        (status = 200, description = "Sync summary", body = SyncReport),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn sync_plugin_catalog(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SyncReport>, AppError> {
    auth_user.require_permission("plugin:manage")?;
    let report = sync_catalog(&state.db, &state.config.plugin.plugins_dir).await?;
    Ok(Json(report))
}
