use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::plugin::*;
use crate::services::catalog::list_catalog;
use crate::services::installation::InstallationService;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Plugins",
    operation_id = "listPlugins",
    summary = "List the plugin catalog",
    description = "Returns every catalogued plugin ordered by name.",
    responses(
        (status = 200, description = "Catalog entries", body = Vec<PluginResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn list_plugins(
    _auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<PluginResponse>>, AppError> {
    let plugins = list_catalog(&state.db).await?;
    Ok(Json(plugins.into_iter().map(PluginResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/{id}/install",
    tag = "Plugins",
    operation_id = "installPlugin",
    summary = "Install a plugin for the caller",
    description = "Creates an installation for the caller, seeds its settings from the manifest defaults and registers the plugin's hooks. A user can install a plugin only once.",
    params(("id" = i32, Path, description = "Catalog plugin ID")),
    responses(
        (status = 201, description = "Plugin installed", body = InstallPluginResponse),
        (status = 400, description = "Invalid manifest (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Plugin not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Already installed (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn install_plugin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let installation_id = InstallationService::new(&state.db, &state.plugins)
        .install_plugin(id, &auth_user.user_id, auth_user.organization_id.clone())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InstallPluginResponse { installation_id }),
    ))
}
