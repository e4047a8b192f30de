//! Directory update requests: filing, listing and the one-time review.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::guard;
use crate::directory::{self, ListScope};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_previous};
use crate::extract::ValidatedJson;
use crate::jwt::AuthUser;
use crate::models::directory::{
    CreateDirectoryUpdateRequest, DirectoryRequestQuery, DirectoryUpdateRequest, ReviewDirectoryUpdateRequest,
};
use crate::rbac::{effective_permissions, required};
use crate::tenant::RequestTenant;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/directory-update-requests", get(list_requests).post(create_request))
        .route("/directory-update-requests/:id", patch(review_request))
}

#[utoipa::path(
    post,
    path = "/directory-update-requests",
    tag = "Directory",
    request_body = CreateDirectoryUpdateRequest,
    responses(
        (status = 201, description = "Request filed", body = DirectoryUpdateRequest),
        (status = 400, description = "Empty or non-editable requestedData"),
        (status = 403, description = "Neither the user nor an administrator of their organization"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_request(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateDirectoryUpdateRequest>,
) -> AppResult<(StatusCode, Json<DirectoryUpdateRequest>)> {
    let principal = guard::authenticate(&state, &auth).await?;

    let request = directory::create_request(&state.pool, &principal, payload).await?;
    log_activity(&state.event_bus, "created", &principal, &request);

    Ok((StatusCode::CREATED, Json(request)))
}

/// Reviewers see every request of the tenant; everyone else only the ones
/// they filed.
#[utoipa::path(
    get,
    path = "/directory-update-requests",
    tag = "Directory",
    params(DirectoryRequestQuery),
    responses(
        (status = 200, description = "Requests visible to the caller", body = Vec<DirectoryUpdateRequest>),
        (status = 403, description = "Foreign organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    tenant: RequestTenant,
    Query(query): Query<DirectoryRequestQuery>,
) -> AppResult<Json<Vec<DirectoryUpdateRequest>>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = guard::target_organization(None, &tenant, &principal)?;
    guard::enter(&principal, organization_id)?;

    let grant = effective_permissions(&state.pool, principal.user_id, organization_id).await?;
    let scope = if grant.permissions.contains_key(&required::directory_manage_requests()) {
        ListScope::All
    } else {
        ListScope::RequestedBy(principal.user_id)
    };

    let requests = directory::list_requests(&state.pool, organization_id, scope, query.status).await?;
    Ok(Json(requests))
}

#[utoipa::path(
    patch,
    path = "/directory-update-requests/{id}",
    tag = "Directory",
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = ReviewDirectoryUpdateRequest,
    responses(
        (status = 200, description = "Request reviewed", body = DirectoryUpdateRequest),
        (status = 400, description = "Status is not APPROVED or REJECTED"),
        (status = 403, description = "Missing directory:manage_requests or foreign organization"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Request already reviewed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn review_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ReviewDirectoryUpdateRequest>,
) -> AppResult<Json<DirectoryUpdateRequest>> {
    let principal = guard::authenticate(&state, &auth).await?;
    let organization_id = directory::fetch_request_organization(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("directory update request not found"))?;
    let principal =
        guard::authorize(&state, principal, organization_id, required::directory_manage_requests()).await?;

    let (before, after) = directory::review_request(&state.pool, organization_id, id, principal.user_id, payload).await?;

    let action = after.status.as_str().to_ascii_lowercase();
    log_activity_with_previous(&state.event_bus, &action, &principal, &after, Some(&before));

    Ok(Json(after))
}
