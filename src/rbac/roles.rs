//! Custom-role storage. Every query here carries the organization predicate.

use std::collections::BTreeSet;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db;
use crate::db::row_parsers::{custom_role_from_row, parse_uuid, user_custom_role_from_row};
use crate::errors::{unique_violation_as_conflict, AppError, AppResult};
use crate::models::rbac::{
    CustomRole, CustomRoleDetail, Permission, RoleCreateRequest, RoleUpdateRequest, UserCustomRole,
    UserRoleAssignment,
};
use crate::rbac::{PermissionCatalog, PermissionDef};
use crate::utils::utc_now;

const ROLE_COLUMNS: &str = "id, organization_id, name, description, based_on, is_system, created_at, updated_at";
const MAX_ROLE_NAME_LEN: usize = 100;

fn normalize_role_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("role name is required"));
    }
    if name.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(AppError::validation(format!(
            "role name must be at most {MAX_ROLE_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checks every id against the catalog. Duplicates collapse.
pub fn resolve_permission_ids(ids: &[String]) -> AppResult<Vec<&'static PermissionDef>> {
    let catalog = PermissionCatalog::global();
    let unique: BTreeSet<&str> = ids.iter().map(|id| id.trim()).collect();

    let unknown: Vec<&str> = unique
        .iter()
        .copied()
        .filter(|id| catalog.get(id).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(AppError::validation(format!(
            "unknown permission ids: {}",
            unknown.join(", ")
        )));
    }

    Ok(unique.into_iter().filter_map(|id| catalog.get(id)).collect())
}

async fn fetch_role(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    role_id: Uuid,
) -> AppResult<Option<CustomRole>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM custom_roles WHERE id = ? AND organization_id = ?");
    let row = sqlx::query(&sql)
        .bind(role_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(custom_role_from_row).transpose()
}

/// Organization a role is stored under, used to pick the tenant a request
/// against `/roles/{id}` is checked against.
pub async fn fetch_role_organization(pool: &SqlitePool, role_id: Uuid) -> AppResult<Option<Uuid>> {
    let org: Option<String> = sqlx::query_scalar("SELECT organization_id FROM custom_roles WHERE id = ?")
        .bind(role_id.to_string())
        .fetch_optional(pool)
        .await?;

    org.as_deref().map(parse_uuid).transpose()
}

async fn role_permissions(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    role_id: Uuid,
) -> AppResult<Vec<Permission>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT permission_id FROM role_permissions WHERE role_id = ? AND organization_id = ? ORDER BY permission_id",
    )
    .bind(role_id.to_string())
    .bind(organization_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let catalog = PermissionCatalog::global();
    Ok(ids
        .iter()
        .filter_map(|id| catalog.get(id))
        .map(Permission::from)
        .collect())
}

async fn assigned_count(conn: &mut SqliteConnection, organization_id: Uuid, role_id: Uuid) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_custom_roles WHERE custom_role_id = ? AND organization_id = ?",
    )
    .bind(role_id.to_string())
    .bind(organization_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

async fn detail(conn: &mut SqliteConnection, role: CustomRole) -> AppResult<CustomRoleDetail> {
    let permissions = role_permissions(conn, role.organization_id, role.id).await?;
    let assigned_users = assigned_count(conn, role.organization_id, role.id).await?;
    Ok(CustomRoleDetail { role, permissions, assigned_users })
}

async fn insert_role_permissions(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    role_id: Uuid,
    permissions: &[&PermissionDef],
) -> AppResult<()> {
    let now = utc_now().to_rfc3339();
    for def in permissions {
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id, organization_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(role_id.to_string())
        .bind(def.id)
        .bind(organization_id.to_string())
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn ensure_name_free(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    name: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM custom_roles WHERE organization_id = ? AND name = ?")
            .bind(organization_id.to_string())
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    let existing = existing.as_deref().map(parse_uuid).transpose()?;
    match existing {
        Some(id) if Some(id) != except => Err(AppError::conflict(name_taken(name))),
        _ => Ok(()),
    }
}

fn name_taken(name: &str) -> String {
    format!("a role named '{name}' already exists in this organization")
}

pub async fn list_roles(pool: &SqlitePool, organization_id: Uuid) -> AppResult<Vec<CustomRoleDetail>> {
    let mut conn = pool.acquire().await?;
    let sql = format!("SELECT {ROLE_COLUMNS} FROM custom_roles WHERE organization_id = ? ORDER BY name");
    let rows = sqlx::query(&sql)
        .bind(organization_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    let mut roles = Vec::with_capacity(rows.len());
    for row in &rows {
        let role = custom_role_from_row(row)?;
        roles.push(detail(&mut conn, role).await?);
    }
    Ok(roles)
}

pub async fn get_role(pool: &SqlitePool, organization_id: Uuid, role_id: Uuid) -> AppResult<CustomRoleDetail> {
    let mut conn = pool.acquire().await?;
    let role = fetch_role(&mut conn, organization_id, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?;
    detail(&mut conn, role).await
}

pub async fn create_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    payload: RoleCreateRequest,
) -> AppResult<CustomRoleDetail> {
    insert_role(pool, organization_id, payload, false).await
}

/// Creates a role flagged as system-owned. Such roles can be listed, read and
/// assigned through the API but never updated or deleted there. Only the
/// administration CLI creates them.
pub async fn create_system_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    payload: RoleCreateRequest,
) -> AppResult<CustomRoleDetail> {
    let created = insert_role(pool, organization_id, payload, true).await?;
    tracing::info!(
        organization_id = %organization_id,
        role_id = %created.role.id,
        name = %created.role.name,
        "system role created"
    );
    Ok(created)
}

async fn insert_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    payload: RoleCreateRequest,
    is_system: bool,
) -> AppResult<CustomRoleDetail> {
    let name = normalize_role_name(&payload.name)?;
    let permissions = resolve_permission_ids(&payload.permission_ids)?;

    let mut tx = pool.begin().await?;

    if !db::lock_row(&mut tx, "organizations", organization_id).await? {
        return Err(AppError::not_found("organization not found"));
    }

    ensure_name_free(&mut tx, organization_id, &name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO custom_roles (id, organization_id, name, description, based_on, is_system, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(organization_id.to_string())
    .bind(&name)
    .bind(normalize_optional(payload.description))
    .bind(normalize_optional(payload.based_on))
    .bind(is_system)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|e| unique_violation_as_conflict(e, "custom_roles.name", &name_taken(&name)))?;

    insert_role_permissions(&mut tx, organization_id, id, &permissions).await?;

    let role = fetch_role(&mut tx, organization_id, id)
        .await?
        .ok_or_else(|| AppError::internal("created role not found"))?;
    let created = detail(&mut tx, role).await?;

    tx.commit().await?;
    Ok(created)
}

/// Applies `payload` and returns the role before and after the change.
/// A present `permission_ids` replaces the whole permission set.
pub async fn update_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    role_id: Uuid,
    payload: RoleUpdateRequest,
) -> AppResult<(CustomRoleDetail, CustomRoleDetail)> {
    let permissions = payload
        .permission_ids
        .as_deref()
        .map(resolve_permission_ids)
        .transpose()?;

    let mut tx = pool.begin().await?;
    db::lock_row(&mut tx, "custom_roles", role_id).await?;

    let current = fetch_role(&mut tx, organization_id, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?;
    if current.is_system {
        return Err(AppError::forbidden("system roles cannot be modified"));
    }

    let name = match payload.name.as_deref() {
        Some(name) => normalize_role_name(name)?,
        None => current.name.clone(),
    };
    if name != current.name {
        ensure_name_free(&mut tx, organization_id, &name, Some(role_id)).await?;
    }

    let description = match payload.description {
        Some(value) => normalize_optional(value),
        None => current.description.clone(),
    };
    let based_on = match payload.based_on {
        Some(value) => normalize_optional(value),
        None => current.based_on.clone(),
    };
    let before = detail(&mut tx, current).await?;

    sqlx::query(
        r#"
        UPDATE custom_roles SET name = ?, description = ?, based_on = ?, updated_at = ?
        WHERE id = ? AND organization_id = ? AND is_system = 0
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(&based_on)
    .bind(utc_now().to_rfc3339())
    .bind(role_id.to_string())
    .bind(organization_id.to_string())
    .execute(&mut *tx)
    .await
    .map_err(|e| unique_violation_as_conflict(e, "custom_roles.name", &name_taken(&name)))?;

    if let Some(permissions) = permissions {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND organization_id = ?")
            .bind(role_id.to_string())
            .bind(organization_id.to_string())
            .execute(&mut *tx)
            .await?;
        insert_role_permissions(&mut tx, organization_id, role_id, &permissions).await?;
    }

    let role = fetch_role(&mut tx, organization_id, role_id)
        .await?
        .ok_or_else(|| AppError::internal("updated role not found"))?;
    let after = detail(&mut tx, role).await?;

    tx.commit().await?;
    Ok((before, after))
}

/// Deletes a role that nobody holds. The delete itself is conditioned on
/// there still being no assignment, so a concurrent assign cannot slip in.
pub async fn delete_role(pool: &SqlitePool, organization_id: Uuid, role_id: Uuid) -> AppResult<CustomRoleDetail> {
    let mut tx = pool.begin().await?;
    db::lock_row(&mut tx, "custom_roles", role_id).await?;

    let role = fetch_role(&mut tx, organization_id, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?;
    if role.is_system {
        return Err(AppError::forbidden("system roles cannot be deleted"));
    }

    let deleted = detail(&mut tx, role).await?;
    if deleted.assigned_users > 0 {
        return Err(in_use(deleted.assigned_users));
    }

    let result = sqlx::query(
        r#"
        DELETE FROM custom_roles
        WHERE id = ? AND organization_id = ? AND is_system = 0
          AND NOT EXISTS (SELECT 1 FROM user_custom_roles WHERE custom_role_id = custom_roles.id)
        "#,
    )
    .bind(role_id.to_string())
    .bind(organization_id.to_string())
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        let restricted = matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation());
        if restricted { in_use(1) } else { AppError::Database(e) }
    })?;

    if result.rows_affected() == 0 {
        let count = assigned_count(&mut tx, organization_id, role_id).await?;
        return Err(in_use(count.max(1)));
    }

    tx.commit().await?;
    Ok(deleted)
}

fn in_use(count: i64) -> AppError {
    AppError::conflict(format!("role is assigned to {count} user(s); revoke it first"))
}

async fn user_in_organization(conn: &mut SqliteConnection, organization_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ? AND organization_id = ?")
        .bind(user_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

const ASSIGNMENT_COLUMNS: &str = "ucr.id, ucr.user_id, ucr.custom_role_id, ucr.organization_id, ucr.assigned_by, ucr.created_at";

pub async fn list_user_roles(
    pool: &SqlitePool,
    organization_id: Uuid,
    user_id: Uuid,
) -> AppResult<Vec<UserRoleAssignment>> {
    let mut conn = pool.acquire().await?;
    let sql = format!(
        r#"
        SELECT {ASSIGNMENT_COLUMNS}
        FROM user_custom_roles ucr
        JOIN custom_roles cr ON cr.id = ucr.custom_role_id AND cr.organization_id = ucr.organization_id
        WHERE ucr.user_id = ? AND ucr.organization_id = ?
        ORDER BY cr.name
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id.to_string())
        .bind(organization_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    let mut assignments = Vec::with_capacity(rows.len());
    for row in &rows {
        let assignment = user_custom_role_from_row(row)?;
        let role = fetch_role(&mut conn, organization_id, assignment.custom_role_id)
            .await?
            .ok_or_else(|| AppError::internal("assigned role disappeared"))?;
        let role = detail(&mut conn, role).await?;
        assignments.push(UserRoleAssignment { assignment, role });
    }
    Ok(assignments)
}

/// Assigns a role of `organization_id` to one of its users.
pub async fn assign_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
    assigned_by: Uuid,
) -> AppResult<UserRoleAssignment> {
    let mut tx = pool.begin().await?;
    db::lock_row(&mut tx, "users", user_id).await?;

    if !user_in_organization(&mut tx, organization_id, user_id).await? {
        return Err(AppError::not_found("user not found"));
    }

    let role = match fetch_role(&mut tx, organization_id, role_id).await? {
        Some(role) => role,
        None => {
            let role_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM custom_roles WHERE id = ?")
                .bind(role_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match role_exists {
                Some(_) => AppError::forbidden("role belongs to a different organization"),
                None => AppError::not_found("role not found"),
            });
        }
    };

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM user_custom_roles WHERE user_id = ? AND custom_role_id = ? AND organization_id = ?",
    )
    .bind(user_id.to_string())
    .bind(role_id.to_string())
    .bind(organization_id.to_string())
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(AppError::conflict("role already assigned to this user"));
    }

    let assignment = UserCustomRole {
        id: Uuid::new_v4(),
        user_id,
        custom_role_id: role_id,
        organization_id,
        assigned_by: Some(assigned_by),
        created_at: utc_now(),
    };

    sqlx::query(
        r#"
        INSERT INTO user_custom_roles (id, user_id, custom_role_id, organization_id, assigned_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(assignment.id.to_string())
    .bind(user_id.to_string())
    .bind(role_id.to_string())
    .bind(organization_id.to_string())
    .bind(assigned_by.to_string())
    .bind(assignment.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(|e| unique_violation_as_conflict(e, "user_custom_roles.custom_role_id", "role already assigned to this user"))?;

    let role = detail(&mut tx, role).await?;
    tx.commit().await?;

    Ok(UserRoleAssignment { assignment, role })
}

pub async fn revoke_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
) -> AppResult<UserCustomRole> {
    let mut tx = pool.begin().await?;
    db::lock_row(&mut tx, "users", user_id).await?;

    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM user_custom_roles ucr WHERE ucr.user_id = ? AND ucr.custom_role_id = ? AND ucr.organization_id = ?"
    );
    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let assignment = row
        .as_ref()
        .map(user_custom_role_from_row)
        .transpose()?
        .ok_or_else(|| AppError::not_found("role assignment not found"))?;

    sqlx::query("DELETE FROM user_custom_roles WHERE id = ? AND organization_id = ?")
        .bind(assignment.id.to_string())
        .bind(organization_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(assignment)
}
