//! Custom role CRUD, scoped to one organization per request.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::guard;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_previous};
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::rbac::{CustomRoleDetail, OrganizationQuery, RoleCreateRequest, RoleUpdateRequest};
use crate::rbac::{required, roles};
use crate::tenant::RequestTenant;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
}

async fn stored_role_organization(state: &AppState, role_id: Uuid) -> AppResult<Uuid> {
    roles::fetch_role_organization(&state.pool, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    params(OrganizationQuery),
    responses(
        (status = 200, description = "Roles of the organization", body = Vec<CustomRoleDetail>),
        (status = 403, description = "Missing roles:view or foreign organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    tenant: RequestTenant,
    Query(query): Query<OrganizationQuery>,
) -> AppResult<Json<Vec<CustomRoleDetail>>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = guard::target_organization(query.organization_id, &tenant, &principal)?;
    guard::authorize(&state, principal, organization_id, required::roles_view()).await?;

    Ok(Json(roles::list_roles(&state.pool, organization_id).await?))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = CustomRoleDetail),
        (status = 400, description = "Invalid name or unknown permission id"),
        (status = 403, description = "Missing roles:create or foreign organization"),
        (status = 409, description = "Role name already exists in the organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    tenant: RequestTenant,
    ValidatedJson(payload): ValidatedJson<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<CustomRoleDetail>)> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = guard::target_organization(payload.organization_id, &tenant, &principal)?;
    let principal = guard::authorize(&state, principal, organization_id, required::roles_create()).await?;

    let role = roles::create_role(&state.pool, organization_id, payload).await?;
    log_activity(&state.event_bus, "created", &principal, &role);

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role with permissions", body = CustomRoleDetail),
        (status = 403, description = "Missing roles:view or foreign organization"),
        (status = 404, description = "Unknown role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CustomRoleDetail>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = stored_role_organization(&state, id).await?;
    guard::authorize(&state, principal, organization_id, required::roles_view()).await?;

    Ok(Json(roles::get_role(&state.pool, organization_id, id).await?))
}

/// A present `permissionIds` replaces the role's whole permission set.
#[utoipa::path(
    put,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = CustomRoleDetail),
        (status = 400, description = "Invalid name or unknown permission id"),
        (status = 403, description = "Missing roles:edit, foreign organization or system role"),
        (status = 404, description = "Unknown role"),
        (status = 409, description = "Role name already exists in the organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<RoleUpdateRequest>,
) -> AppResult<Json<CustomRoleDetail>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = stored_role_organization(&state, id).await?;
    let principal = guard::authorize(&state, principal, organization_id, required::roles_edit()).await?;

    let (before, after) = roles::update_role(&state.pool, organization_id, id, payload).await?;
    log_activity_with_previous(&state.event_bus, "updated", &principal, &after, Some(&before));

    Ok(Json(after))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Missing roles:delete, foreign organization or system role"),
        (status = 404, description = "Unknown role"),
        (status = 409, description = "Role is still assigned to users")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = stored_role_organization(&state, id).await?;
    let principal = guard::authorize(&state, principal, organization_id, required::roles_delete()).await?;

    let deleted = roles::delete_role(&state.pool, organization_id, id).await?;
    log_activity(&state.event_bus, "deleted", &principal, &deleted);

    Ok(StatusCode::NO_CONTENT)
}
