use async_trait::async_trait;

use super::principal::{Principal, ResourceContext};
use crate::rbac::PermissionKey;

/// Policy evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Check if the principal may perform `permission` in the context's organization
    async fn can(&self, principal: &Principal, permission: &PermissionKey, ctx: &ResourceContext) -> bool;
}

/// Default policy evaluator
///
/// Evaluation order:
/// 1. foreign organization and not super_admin -> deny
/// 2. super_admin -> allow
/// 3. effective permission set contains the key -> allow
/// 4. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for DefaultPolicyEvaluator {
    async fn can(&self, principal: &Principal, permission: &PermissionKey, ctx: &ResourceContext) -> bool {
        if !principal.may_enter(ctx.organization_id) {
            tracing::warn!(
                user_id = %principal.user_id,
                organization_id = %ctx.organization_id,
                permission = %permission,
                "cross-tenant access denied"
            );
            return false;
        }

        if principal.is_super_admin() {
            tracing::debug!(
                user_id = %principal.user_id,
                permission = %permission,
                "super_admin bypass"
            );
            return true;
        }

        if principal.has_permission(permission) {
            tracing::debug!(
                user_id = %principal.user_id,
                permission = %permission,
                "permission granted"
            );
            return true;
        }

        tracing::debug!(
            user_id = %principal.user_id,
            permission = %permission,
            "permission denied"
        );
        false
    }
}
