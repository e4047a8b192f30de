use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};
use crate::models::user::BuiltInRole;
use crate::rbac::catalog::PermissionDef;

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    #[schema(example = "perm_payment_view")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    #[schema(example = "payments")]
    pub resource: String,
    #[schema(example = "view")]
    pub action: String,
}

impl From<&PermissionDef> for Permission {
    fn from(def: &PermissionDef) -> Self {
        Permission {
            id: def.id.to_string(),
            name: def.name.to_string(),
            description: def.description.to_string(),
            category: def.category.to_string(),
            resource: def.resource.to_string(),
            action: def.action.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCategory {
    pub category: String,
    pub permissions: Vec<Permission>,
}

// =============================================================================
// CUSTOM ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomRole {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Name of the role this one was modelled on. Informational only.
    pub based_on: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for CustomRole {
    fn entity_type() -> &'static str { "custom_role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn organization_id(&self) -> Option<Uuid> { Some(self.organization_id) }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// A role together with its stored permission set and assignment count.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomRoleDetail {
    #[serde(flatten)]
    pub role: CustomRole,
    pub permissions: Vec<Permission>,
    pub assigned_users: i64,
}

impl Loggable for CustomRoleDetail {
    fn entity_type() -> &'static str { "custom_role" }
    fn subject_id(&self) -> Uuid { self.role.id }
    fn organization_id(&self) -> Option<Uuid> { Some(self.role.organization_id) }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleCreateRequest {
    #[schema(example = "Treasurer")]
    pub name: String,
    #[schema(example = "Handles dues and payments")]
    pub description: Option<String>,
    #[schema(example = "ADMIN")]
    pub based_on: Option<String>,
    #[serde(default)]
    #[schema(example = json!(["perm_payment_view", "perm_payment_edit"]))]
    pub permission_ids: Vec<String>,
    /// Defaults to the Host tenant, then the caller's own organization.
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    /// Absent keeps the stored value; `null` or a blank string clears it.
    #[serde(default, deserialize_with = "super::double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::double_option")]
    #[schema(value_type = Option<String>, example = "USER")]
    pub based_on: Option<Option<String>>,
    /// When present, replaces the role's whole permission set.
    pub permission_ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrganizationQuery {
    pub organization_id: Option<Uuid>,
}

// =============================================================================
// USER-ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCustomRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub custom_role_id: Uuid,
    pub organization_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for UserCustomRole {
    fn entity_type() -> &'static str { "user_custom_role" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn organization_id(&self) -> Option<Uuid> { Some(self.organization_id) }
    fn severity(&self) -> Severity { Severity::Critical }
    fn severity_for_action(&self, _action: &str) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleAssignment {
    #[serde(flatten)]
    pub assignment: UserCustomRole,
    pub role: CustomRoleDetail,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleRequest {
    pub custom_role_id: Uuid,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RevokeRoleQuery {
    pub custom_role_id: Uuid,
}

// =============================================================================
// EFFECTIVE PERMISSIONS (computed)
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub built_in_role: BuiltInRole,
    pub custom_roles: Vec<String>,
    /// `resource:action` keys, sorted.
    #[schema(example = json!(["payments:edit", "payments:view"]))]
    pub permissions: Vec<String>,
}
