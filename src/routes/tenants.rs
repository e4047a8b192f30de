//! Host resolution and per-tenant domain configuration.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::guard;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity_with_previous;
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::organization::{DomainConfig, DomainUpdateRequest, ResolvedTenant};
use crate::rbac::required;
use crate::tenant::domain::{self, DomainChange};
use crate::tenant::RequestTenant;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tenant", get(current_tenant))
        .route(
            "/tenants/:id/domain",
            get(get_domain).put(update_domain).delete(clear_domain),
        )
}

/// Organization served at the request's Host header.
#[utoipa::path(
    get,
    path = "/tenant",
    tag = "Tenants",
    responses(
        (status = 200, description = "Tenant for this host", body = ResolvedTenant),
        (status = 404, description = "Host is the platform itself or unknown")
    )
)]
pub async fn current_tenant(RequestTenant(tenant): RequestTenant) -> AppResult<Json<ResolvedTenant>> {
    tenant
        .map(Json)
        .ok_or_else(|| AppError::not_found("no tenant is served at this host"))
}

#[utoipa::path(
    get,
    path = "/tenants/{id}/domain",
    tag = "Tenants",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Domain configuration", body = DomainConfig),
        (status = 403, description = "Missing organization:manage or foreign organization"),
        (status = 404, description = "Unknown organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_domain(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DomainConfig>> {
    let principal = guard::authenticate(&state, &auth).await?;
    guard::authorize(&state, principal, id, required::organization_manage()).await?;

    let organization = domain::fetch_organization(&state.pool, id).await?;
    Ok(Json(domain::domain_config(&state.config.tenancy, &organization)))
}

/// Partial update. Setting a custom domain issues a fresh verification token
/// and resets verification; an explicit `null` clears the field.
#[utoipa::path(
    put,
    path = "/tenants/{id}/domain",
    tag = "Tenants",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = DomainUpdateRequest,
    responses(
        (status = 200, description = "Domain configuration updated", body = DomainConfig),
        (status = 400, description = "Invalid subdomain or custom domain"),
        (status = 403, description = "Missing organization:manage or foreign organization"),
        (status = 409, description = "Subdomain or custom domain already taken")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_domain(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<DomainUpdateRequest>,
) -> AppResult<Json<DomainConfig>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let principal = guard::authorize(&state, principal, id, required::organization_manage()).await?;

    let change = DomainChange::validate(payload, &state.config.tenancy)?;
    let (before, after) = domain::update_domain(&state.pool, id, change).await?;

    log_activity_with_previous(&state.event_bus, "domain_updated", &principal, &after, Some(&before));

    Ok(Json(domain::domain_config(&state.config.tenancy, &after)))
}

/// Removes the custom domain and its verification and SSL state. The
/// subdomain is kept.
#[utoipa::path(
    delete,
    path = "/tenants/{id}/domain",
    tag = "Tenants",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Custom domain removed", body = DomainConfig),
        (status = 403, description = "Missing organization:manage or foreign organization"),
        (status = 404, description = "Unknown organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn clear_domain(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DomainConfig>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let principal = guard::authorize(&state, principal, id, required::organization_manage()).await?;

    let (before, after) = domain::clear_custom_domain(&state.pool, id).await?;

    log_activity_with_previous(&state.event_bus, "domain_cleared", &principal, &after, Some(&before));

    Ok(Json(domain::domain_config(&state.config.tenancy, &after)))
}
