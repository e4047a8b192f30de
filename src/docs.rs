use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};

use crate::app::AppState;
use crate::{models, routes, tenant};

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::login,
        routes::auth::me,
        routes::permissions::list_permissions,
        routes::tenants::current_tenant,
        routes::tenants::get_domain,
        routes::tenants::update_domain,
        routes::tenants::clear_domain,
        routes::roles::list_roles,
        routes::roles::create_role,
        routes::roles::get_role,
        routes::roles::update_role,
        routes::roles::delete_role,
        routes::user_roles::list_user_roles,
        routes::user_roles::assign_role,
        routes::user_roles::revoke_role,
        routes::user_roles::get_effective_permissions,
        routes::directory::create_request,
        routes::directory::list_requests,
        routes::directory::review_request,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            models::user::BuiltInRole,
            models::user::User,
            models::user::LoginRequest,
            models::user::AuthResponse,
            models::organization::Organization,
            models::organization::SslCertificateStatus,
            models::organization::DomainVerificationState,
            models::organization::DomainConfig,
            models::organization::DomainUpdateRequest,
            models::organization::ResolvedTenant,
            models::organization::TenantSource,
            tenant::validation::Validation,
            models::rbac::Permission,
            models::rbac::PermissionCategory,
            models::rbac::CustomRole,
            models::rbac::CustomRoleDetail,
            models::rbac::RoleCreateRequest,
            models::rbac::RoleUpdateRequest,
            models::rbac::UserCustomRole,
            models::rbac::UserRoleAssignment,
            models::rbac::AssignRoleRequest,
            models::rbac::EffectivePermissions,
            models::directory::RequestStatus,
            models::directory::UpdateType,
            models::directory::DirectoryUpdateRequest,
            models::directory::CreateDirectoryUpdateRequest,
            models::directory::ReviewDirectoryUpdateRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and database probe"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Permissions", description = "Permission catalog"),
        (name = "Tenants", description = "Host resolution and domain configuration"),
        (name = "Roles", description = "Custom role management"),
        (name = "User Roles", description = "Role assignments and effective permissions"),
        (name = "Directory", description = "Directory update requests")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI document with a local server entry for `port`.
pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
    doc
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
