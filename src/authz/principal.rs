use uuid::Uuid;

use crate::models::user::BuiltInRole;
use crate::rbac::{PermissionKey, PermissionSet};

/// The authenticated caller, re-read from the store on every request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: BuiltInRole,
    /// `None` only for platform-level super administrators.
    pub organization_id: Option<Uuid>,
    /// Effective permissions within the organization being acted on.
    pub permissions: PermissionSet,
}

impl Principal {
    pub fn new(user_id: Uuid, role: BuiltInRole, organization_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            role,
            organization_id,
            permissions: PermissionSet::default(),
        }
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == BuiltInRole::SuperAdmin
    }

    pub fn has_permission(&self, permission: &PermissionKey) -> bool {
        self.permissions.contains_key(permission)
    }

    /// Only SUPER_ADMIN may act outside its own organization.
    pub fn may_enter(&self, organization_id: Uuid) -> bool {
        self.is_super_admin() || self.organization_id == Some(organization_id)
    }
}

/// The tenant a permission is being checked in.
#[derive(Debug, Clone, Copy)]
pub struct ResourceContext {
    pub organization_id: Uuid,
}

impl ResourceContext {
    pub fn new(organization_id: Uuid) -> Self {
        Self { organization_id }
    }
}
