//! Custom role assignments and effective permissions of a user.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::guard;
use crate::db::users::fetch_user_by_id;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::rbac::{
    AssignRoleRequest, EffectivePermissions, OrganizationQuery, RevokeRoleQuery, UserRoleAssignment,
};
use crate::rbac::{effective_permissions, required, roles};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:id/roles",
            get(list_user_roles).post(assign_role).delete(revoke_role),
        )
        .route("/users/:id/effective-permissions", get(get_effective_permissions))
}

async fn stored_user_organization(state: &AppState, user_id: Uuid) -> AppResult<Uuid> {
    let user = fetch_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    user.organization_id
        .ok_or_else(|| AppError::validation("user does not belong to an organization"))
}

#[utoipa::path(
    get,
    path = "/users/{id}/roles",
    tag = "User Roles",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Custom roles held by the user", body = Vec<UserRoleAssignment>),
        (status = 403, description = "Missing users:view or foreign organization"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_user_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<UserRoleAssignment>>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = stored_user_organization(&state, id).await?;
    guard::authorize(&state, principal, organization_id, required::users_view()).await?;

    Ok(Json(roles::list_user_roles(&state.pool, organization_id, id).await?))
}

#[utoipa::path(
    post,
    path = "/users/{id}/roles",
    tag = "User Roles",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 201, description = "Role assigned", body = UserRoleAssignment),
        (status = 403, description = "Missing users:manage_roles, foreign organization or role from another organization"),
        (status = 404, description = "Unknown user or role"),
        (status = 409, description = "Role already assigned")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<AssignRoleRequest>,
) -> AppResult<(StatusCode, Json<UserRoleAssignment>)> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = stored_user_organization(&state, id).await?;
    let principal = guard::authorize(&state, principal, organization_id, required::users_manage_roles()).await?;

    let assignment = roles::assign_role(
        &state.pool,
        organization_id,
        id,
        payload.custom_role_id,
        principal.user_id,
    )
    .await?;
    log_activity(&state.event_bus, "assigned", &principal, &assignment.assignment);

    Ok((StatusCode::CREATED, Json(assignment)))
}

#[utoipa::path(
    delete,
    path = "/users/{id}/roles",
    tag = "User Roles",
    params(("id" = Uuid, Path, description = "User id"), RevokeRoleQuery),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 403, description = "Missing users:manage_roles or foreign organization"),
        (status = 404, description = "Unknown user or assignment")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<RevokeRoleQuery>,
) -> AppResult<StatusCode> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = stored_user_organization(&state, id).await?;
    let principal = guard::authorize(&state, principal, organization_id, required::users_manage_roles()).await?;

    let revoked = roles::revoke_role(&state.pool, organization_id, id, query.custom_role_id).await?;
    log_activity(&state.event_bus, "revoked", &principal, &revoked);

    Ok(StatusCode::NO_CONTENT)
}

/// Built-in grant plus every custom role the user holds in the evaluated
/// organization. Defaults to the user's own organization.
#[utoipa::path(
    get,
    path = "/users/{id}/effective-permissions",
    tag = "User Roles",
    params(("id" = Uuid, Path, description = "User id"), OrganizationQuery),
    responses(
        (status = 200, description = "Effective permissions", body = EffectivePermissions),
        (status = 403, description = "Missing users:view or foreign organization"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_effective_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<OrganizationQuery>,
) -> AppResult<Json<EffectivePermissions>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = match query.organization_id {
        Some(organization_id) => organization_id,
        None => stored_user_organization(&state, id).await?,
    };
    guard::authorize(&state, principal, organization_id, required::users_view()).await?;

    let grant = effective_permissions(&state.pool, id, organization_id).await?;

    Ok(Json(EffectivePermissions {
        user_id: grant.user_id,
        organization_id: grant.organization_id,
        built_in_role: grant.built_in_role,
        custom_roles: grant.custom_roles,
        permissions: grant.permissions.to_strings(),
    }))
}
