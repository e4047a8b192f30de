use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::jwt::AuthUser;
use crate::models::rbac::{Permission, PermissionCategory};
use crate::rbac::PermissionCatalog;

pub fn routes() -> Router<AppState> {
    Router::new().route("/permissions", get(list_permissions))
}

/// The permission catalog grouped by category.
#[utoipa::path(
    get,
    path = "/permissions",
    tag = "Roles",
    responses(
        (status = 200, description = "Permission catalog", body = Vec<PermissionCategory>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(_auth: AuthUser) -> Json<Vec<PermissionCategory>> {
    let categories = PermissionCatalog::global()
        .by_category()
        .into_iter()
        .map(|(category, defs)| PermissionCategory {
            category: category.to_string(),
            permissions: defs.into_iter().map(Permission::from).collect(),
        })
        .collect();

    Json(categories)
}
