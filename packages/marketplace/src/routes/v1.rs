use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/plugins", plugin_routes())
        .nest("/installations", installation_routes())
        .nest("/hooks", hook_routes())
        .nest("/admin", admin_routes())
}

fn plugin_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::plugin::list_plugins))
        .routes(routes!(handlers::plugin::install_plugin))
}

fn installation_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::installation::list_installations))
        .routes(routes!(
            handlers::installation::get_installation,
            handlers::installation::uninstall_plugin,
            handlers::installation::toggle_plugin
        ))
        .routes(routes!(
            handlers::installation::get_settings,
            handlers::installation::update_settings
        ))
        .routes(routes!(handlers::installation::get_logs))
}

fn hook_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::hook::dispatch_hook))
}

fn admin_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::admin::sync_plugin_catalog))
}
