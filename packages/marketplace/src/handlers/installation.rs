use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::installation::*;
use crate::services::activity::get_plugin_logs;
use crate::services::installation::InstallationService;
use crate::services::settings::SettingsService;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Installations",
    operation_id = "getUserPlugins",
    summary = "List the caller's installations",
    responses(
        (status = 200, description = "Installations with catalog names", body = Vec<InstallationResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_installations(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<InstallationResponse>>, AppError> {
    let plugins = InstallationService::new(&state.db, &state.plugins)
        .get_user_plugins(&auth_user.user_id)
        .await?;
    Ok(Json(plugins.into_iter().map(InstallationResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Installations",
    operation_id = "getInstallation",
    summary = "Get one installation",
    params(("id" = i32, Path, description = "Installation ID")),
    responses(
        (status = 200, description = "Installation", body = InstallationResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or owned by another user (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_installation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<InstallationResponse>, AppError> {
    let installation = InstallationService::new(&state.db, &state.plugins)
        .get_by_id(id, &auth_user.user_id)
        .await?;
    Ok(Json(installation.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Installations",
    operation_id = "uninstallPlugin",
    summary = "Uninstall a plugin",
    description = "Deletes the installation together with its settings, logs and storage.",
    params(("id" = i32, Path, description = "Installation ID")),
    responses(
        (status = 204, description = "Uninstalled"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or owned by another user (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn uninstall_plugin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    InstallationService::new(&state.db, &state.plugins)
        .uninstall_plugin(id, &auth_user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Installations",
    operation_id = "togglePlugin",
    summary = "Enable or disable an installation",
    params(("id" = i32, Path, description = "Installation ID")),
    request_body = TogglePluginRequest,
    responses(
        (status = 200, description = "Updated installation", body = InstallationResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or owned by another user (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn toggle_plugin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<TogglePluginRequest>,
) -> Result<Json<InstallationResponse>, AppError> {
    let installation = InstallationService::new(&state.db, &state.plugins)
        .toggle_plugin(id, &auth_user.user_id, payload.is_active)
        .await?;
    Ok(Json(installation.into()))
}

#[utoipa::path(
    get,
    path = "/{id}/settings",
    tag = "Installations",
    operation_id = "getPluginSettings",
    summary = "List an installation's settings",
    params(("id" = i32, Path, description = "Installation ID")),
    responses(
        (status = 200, description = "Settings", body = Vec<SettingResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or owned by another user (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_settings(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<SettingResponse>>, AppError> {
    let rows = SettingsService::new(&state.db)
        .get_settings(id, &auth_user.user_id)
        .await?;
    Ok(Json(rows.into_iter().map(SettingResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/{id}/settings",
    tag = "Installations",
    operation_id = "updatePluginSettings",
    summary = "Update an installation's settings",
    description = "Validates every value against its declared type before writing any of them. Unknown keys are rejected. Settings not mentioned are left unchanged.",
    params(("id" = i32, Path, description = "Installation ID")),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings after the update", body = SettingsSnapshotResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or owned by another user (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn update_settings(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateSettingsRequest>,
) -> Result<Json<SettingsSnapshotResponse>, AppError> {
    let settings = SettingsService::new(&state.db)
        .update_plugin_settings(id, &auth_user.user_id, &payload.settings)
        .await?;
    Ok(Json(SettingsSnapshotResponse { settings }))
}

#[utoipa::path(
    get,
    path = "/{id}/logs",
    tag = "Installations",
    operation_id = "getPluginLogs",
    summary = "Read an installation's activity log",
    description = "Returns the newest entries first.",
    params(("id" = i32, Path, description = "Installation ID"), LogQuery),
    responses(
        (status = 200, description = "Log entries", body = Vec<LogResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or owned by another user (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn get_logs(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogResponse>>, AppError> {
    let logs = get_plugin_logs(&state.db, id, &auth_user.user_id, query.limit).await?;
    Ok(Json(logs.into_iter().map(LogResponse::from).collect()))
}
