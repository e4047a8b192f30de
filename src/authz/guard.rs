//! The sequence every protected handler runs: authenticate, pick the target
//! tenant, check tenant membership, then check the required permission.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::{Principal, ResourceContext};
use crate::app::AppState;
use crate::db::users::fetch_user_by_id;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::rbac::{effective_permissions, PermissionKey};
use crate::tenant::RequestTenant;

/// Re-reads the caller's role and organization. A token for a user that no
/// longer exists is treated as unauthenticated.
pub async fn load_principal(pool: &SqlitePool, user_id: Uuid) -> AppResult<Principal> {
    let user = fetch_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;

    Ok(Principal::new(user.id, user.role, user.organization_id))
}

pub async fn authenticate(state: &AppState, auth: &AuthUser) -> AppResult<Principal> {
    load_principal(&state.pool, auth.user_id).await
}

/// Tenant for requests that do not address a stored record: an explicit
/// `organizationId`, else the Host tenant, else the caller's own organization.
pub fn target_organization(
    explicit: Option<Uuid>,
    tenant: &RequestTenant,
    principal: &Principal,
) -> AppResult<Uuid> {
    explicit
        .or_else(|| tenant.0.as_ref().map(|t| t.organization_id))
        .or(principal.organization_id)
        .ok_or_else(|| AppError::validation("organizationId is required"))
}

/// Fails with Forbidden unless the principal may act in `organization_id`.
pub fn enter(principal: &Principal, organization_id: Uuid) -> AppResult<()> {
    if principal.may_enter(organization_id) {
        return Ok(());
    }

    tracing::warn!(
        user_id = %principal.user_id,
        own_organization_id = ?principal.organization_id,
        organization_id = %organization_id,
        "cross-tenant request rejected"
    );
    Err(AppError::forbidden("access to another organization is not allowed"))
}

/// Loads the principal's effective permissions in `organization_id` and
/// requires `permission`. Returns the principal carrying that permission set.
pub async fn authorize(
    state: &AppState,
    principal: Principal,
    organization_id: Uuid,
    permission: PermissionKey,
) -> AppResult<Principal> {
    enter(&principal, organization_id)?;

    let grant = effective_permissions(&state.pool, principal.user_id, organization_id).await?;
    let principal = principal.with_permissions(grant.permissions);

    if state
        .evaluator
        .can(&principal, &permission, &ResourceContext::new(organization_id))
        .await
    {
        return Ok(principal);
    }

    Err(AppError::forbidden(format!("missing permission {permission}")))
}
