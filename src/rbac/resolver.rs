use std::collections::BTreeMap;

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers::parse_uuid;
use crate::db::users::fetch_user_by_id;
use crate::errors::{AppError, AppResult};
use crate::models::user::BuiltInRole;
use crate::rbac::{PermissionCatalog, PermissionSet};

/// Permissions contributed by one assigned custom role.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub role_id: Uuid,
    pub role_name: String,
    /// Organization the role itself belongs to.
    pub organization_id: Uuid,
    pub permissions: PermissionSet,
}

/// Effective permission set of a user within one organization.
#[derive(Debug, Clone)]
pub struct EffectiveGrant {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub built_in_role: BuiltInRole,
    /// Names of the custom roles that contributed, sorted.
    pub custom_roles: Vec<String>,
    pub permissions: PermissionSet,
}

/// Combines a built-in role with the custom-role grants of one organization.
///
/// `member_of` is the organization stored on the user record. SUPER_ADMIN
/// always gets the whole universe. Anyone else evaluated against an
/// organization they do not belong to gets nothing. Grants whose role lives in
/// a different organization are dropped regardless of how they were joined.
pub fn aggregate(
    catalog: &PermissionCatalog,
    user_id: Uuid,
    role: BuiltInRole,
    member_of: Option<Uuid>,
    organization_id: Uuid,
    grants: &[RoleGrant],
) -> EffectiveGrant {
    let mut custom_roles = Vec::new();
    let mut permissions = PermissionSet::default();

    let is_member = member_of == Some(organization_id);

    if role == BuiltInRole::SuperAdmin || is_member {
        permissions.extend(catalog.built_in(role));

        for grant in grants {
            if grant.organization_id != organization_id {
                tracing::warn!(
                    user_id = %user_id,
                    role_id = %grant.role_id,
                    role_organization_id = %grant.organization_id,
                    organization_id = %organization_id,
                    "ignoring custom role scoped to another organization"
                );
                continue;
            }
            permissions.extend(&grant.permissions);
            custom_roles.push(grant.role_name.clone());
        }
    }

    custom_roles.sort();
    custom_roles.dedup();

    EffectiveGrant {
        user_id,
        organization_id,
        built_in_role: role,
        custom_roles,
        permissions,
    }
}

/// Loads the custom-role grants a user holds in `organization_id`.
pub async fn load_role_grants(
    pool: &SqlitePool,
    user_id: Uuid,
    organization_id: Uuid,
) -> AppResult<Vec<RoleGrant>> {
    let rows = sqlx::query(
        r#"
        SELECT cr.id AS role_id, cr.name AS role_name, cr.organization_id AS role_organization_id,
               rp.permission_id AS permission_id, rp.organization_id AS permission_organization_id
        FROM user_custom_roles ucr
        JOIN custom_roles cr ON cr.id = ucr.custom_role_id
        LEFT JOIN role_permissions rp ON rp.role_id = cr.id
        WHERE ucr.user_id = ? AND ucr.organization_id = ?
        ORDER BY cr.name
        "#,
    )
    .bind(user_id.to_string())
    .bind(organization_id.to_string())
    .fetch_all(pool)
    .await?;

    let catalog = PermissionCatalog::global();
    let mut grants: BTreeMap<Uuid, RoleGrant> = BTreeMap::new();

    for row in rows {
        let role_id = parse_uuid(&row.try_get::<String, _>("role_id")?)?;
        let role_organization_id = parse_uuid(&row.try_get::<String, _>("role_organization_id")?)?;
        let role_name: String = row.try_get("role_name")?;

        let grant = grants.entry(role_id).or_insert_with(|| RoleGrant {
            role_id,
            role_name,
            organization_id: role_organization_id,
            permissions: PermissionSet::default(),
        });

        let permission_id: Option<String> = row.try_get("permission_id")?;
        let permission_organization_id: Option<String> = row.try_get("permission_organization_id")?;
        let (Some(permission_id), Some(permission_organization_id)) = (permission_id, permission_organization_id) else {
            continue;
        };

        if parse_uuid(&permission_organization_id)? != grant.organization_id {
            tracing::warn!(role_id = %role_id, permission_id = %permission_id, "role permission row scoped to another organization");
            continue;
        }

        match catalog.get(&permission_id) {
            Some(def) => {
                grant.permissions.insert(def.key());
            }
            None => tracing::warn!(role_id = %role_id, permission_id = %permission_id, "role references unknown permission"),
        }
    }

    Ok(grants.into_values().collect())
}

/// Effective permissions of `user_id` when acting within `organization_id`.
pub async fn effective_permissions(
    pool: &SqlitePool,
    user_id: Uuid,
    organization_id: Uuid,
) -> AppResult<EffectiveGrant> {
    let user = fetch_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let grants = if user.role == BuiltInRole::SuperAdmin || user.organization_id == Some(organization_id) {
        load_role_grants(pool, user_id, organization_id).await?
    } else {
        Vec::new()
    };

    Ok(aggregate(
        PermissionCatalog::global(),
        user.id,
        user.role,
        user.organization_id,
        organization_id,
        &grants,
    ))
}
