use axum::Json;
use axum::extract::{Path, State};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::plugin::{DispatchHookRequest, DispatchHookResponse};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/{name}",
    tag = "Hooks",
    operation_id = "dispatchHook",
    summary = "Fire a hook for the caller",
    description = "Runs every callback bound to the hook for the caller's enabled installations, highest priority first. A failing callback yields an error entry without stopping the others. Requires `plugin:dispatch` permission.",
    params(("name" = String, Path, description = "Hook name")),
    request_body = DispatchHookRequest,
    responses(
        (status = 200, description = "Callback results", body = DispatchHookResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn dispatch_hook(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
    AppJson(payload): AppJson<DispatchHookRequest>,
) -> Result<Json<DispatchHookResponse>, AppError> {
    auth_user.require_permission("plugin:dispatch")?;

    let outcomes = state
        .plugins
        .dispatch(&state.db, &name, &payload.data, &auth_user.user_id)
        .await?;
    let results = outcomes
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(DispatchHookResponse { hook: name, results }))
}
