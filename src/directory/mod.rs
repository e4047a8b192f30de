//! Directory update requests: proposed profile changes that an administrator
//! approves or rejects exactly once.

use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::authz::{guard, Principal};
use crate::db;
use crate::db::row_parsers::{directory_request_from_row, parse_uuid};
use crate::db::users::fetch_user_by_id;
use crate::errors::{AppError, AppResult};
use crate::models::directory::{
    CreateDirectoryUpdateRequest, DirectoryUpdateRequest, RequestStatus, ReviewDirectoryUpdateRequest,
};
use crate::models::user::DbUser;
use crate::utils::utc_now;

/// Profile fields a request may change: JSON key and `users` column.
pub const PROFILE_FIELDS: &[(&str, &str)] = &[
    ("name", "name"),
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("phone", "phone"),
    ("unitNumber", "unit_number"),
];

const REQUEST_COLUMNS: &str = "id, organization_id, user_id, requested_by, update_type, current_data, requested_data, reason, status, reviewed_by_id, reviewed_at, review_notes, created_at, updated_at";

/// Column assignments described by `requested_data`. Values must be strings
/// or `null`; unknown keys are rejected.
pub fn profile_changes(requested_data: &Map<String, Value>) -> AppResult<Vec<(&'static str, Option<String>)>> {
    if requested_data.is_empty() {
        return Err(AppError::validation("requestedData must not be empty"));
    }

    requested_data
        .iter()
        .map(|(key, value)| {
            let column = PROFILE_FIELDS
                .iter()
                .find(|(field, _)| *field == key.as_str())
                .map(|(_, column)| *column)
                .ok_or_else(|| AppError::validation(format!("requestedData.{key} is not an editable profile field")))?;

            match value {
                Value::String(s) => Ok((column, Some(s.trim().to_string()))),
                Value::Null => Ok((column, None)),
                _ => Err(AppError::validation(format!("requestedData.{key} must be a string or null"))),
            }
        })
        .collect()
}

fn profile_value(user: &DbUser, key: &str) -> Option<String> {
    match key {
        "name" => user.name.clone(),
        "firstName" => user.first_name.clone(),
        "lastName" => user.last_name.clone(),
        "phone" => user.phone.clone(),
        "unitNumber" => user.unit_number.clone(),
        _ => None,
    }
}

/// Current values of the fields a request touches.
pub fn snapshot(user: &DbUser, requested_data: &Map<String, Value>) -> Map<String, Value> {
    requested_data
        .keys()
        .map(|key| {
            let value = profile_value(user, key).map(Value::String).unwrap_or(Value::Null);
            (key.clone(), value)
        })
        .collect()
}

async fn fetch_request(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    request_id: Uuid,
) -> AppResult<Option<DirectoryUpdateRequest>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM directory_update_requests WHERE id = ? AND organization_id = ?");
    let row = sqlx::query(&sql)
        .bind(request_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(directory_request_from_row).transpose()
}

/// Organization a request is stored under.
pub async fn fetch_request_organization(pool: &SqlitePool, request_id: Uuid) -> AppResult<Option<Uuid>> {
    let org: Option<String> = sqlx::query_scalar("SELECT organization_id FROM directory_update_requests WHERE id = ?")
        .bind(request_id.to_string())
        .fetch_optional(pool)
        .await?;

    org.as_deref().map(parse_uuid).transpose()
}

/// Files a request against `payload.user_id`. The requester must belong to
/// the target's organization and be either the target or an administrator.
pub async fn create_request(
    pool: &SqlitePool,
    requester: &Principal,
    payload: CreateDirectoryUpdateRequest,
) -> AppResult<DirectoryUpdateRequest> {
    let target = fetch_user_by_id(pool, payload.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    let organization_id = target
        .organization_id
        .ok_or_else(|| AppError::validation("target user does not belong to an organization"))?;

    guard::enter(requester, organization_id)?;
    if requester.user_id != target.id && !requester.role.is_admin() {
        return Err(AppError::forbidden("only the user or an administrator may request this change"));
    }

    profile_changes(&payload.requested_data)?;

    let now = utc_now();
    let request = DirectoryUpdateRequest {
        id: Uuid::new_v4(),
        organization_id,
        user_id: target.id,
        requested_by: requester.user_id,
        update_type: payload.update_type,
        current_data: Some(snapshot(&target, &payload.requested_data)),
        requested_data: payload.requested_data,
        reason: payload.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        status: RequestStatus::Pending,
        reviewed_by_id: None,
        reviewed_at: None,
        review_notes: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO directory_update_requests
            (id, organization_id, user_id, requested_by, update_type, current_data, requested_data, reason, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(request.id.to_string())
    .bind(organization_id.to_string())
    .bind(request.user_id.to_string())
    .bind(request.requested_by.to_string())
    .bind(request.update_type.as_str())
    .bind(serde_json::to_string(&request.current_data).map_err(|e| AppError::internal(e.to_string()))?)
    .bind(serde_json::to_string(&request.requested_data).map_err(|e| AppError::internal(e.to_string()))?)
    .bind(&request.reason)
    .bind(request.status.as_str())
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(request)
}

/// Which requests of a tenant a caller may list.
#[derive(Debug, Clone, Copy)]
pub enum ListScope {
    All,
    RequestedBy(Uuid),
}

pub async fn list_requests(
    pool: &SqlitePool,
    organization_id: Uuid,
    scope: ListScope,
    status: Option<RequestStatus>,
) -> AppResult<Vec<DirectoryUpdateRequest>> {
    let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM directory_update_requests WHERE organization_id = ?");
    if matches!(scope, ListScope::RequestedBy(_)) {
        sql.push_str(" AND requested_by = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query(&sql).bind(organization_id.to_string());
    if let ListScope::RequestedBy(user_id) = scope {
        query = query.bind(user_id.to_string());
    }
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(directory_request_from_row).collect()
}

/// Moves a PENDING request to its terminal state. On approval the requested
/// fields are written to the target profile in the same transaction. Returns
/// the request before and after.
///
/// Concurrent reviews of one request queue on the row lock; the later one
/// sees the terminal status and gets a conflict.
pub async fn review_request(
    pool: &SqlitePool,
    organization_id: Uuid,
    request_id: Uuid,
    reviewer_id: Uuid,
    review: ReviewDirectoryUpdateRequest,
) -> AppResult<(DirectoryUpdateRequest, DirectoryUpdateRequest)> {
    if !review.status.is_terminal() {
        return Err(AppError::validation("status must be APPROVED or REJECTED"));
    }

    let mut tx = pool.begin().await?;
    db::lock_row(&mut tx, "directory_update_requests", request_id).await?;

    let current = fetch_request(&mut tx, organization_id, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("directory update request not found"))?;
    if current.status.is_terminal() {
        return Err(already_reviewed(current.status));
    }

    let now = utc_now();
    let review_notes = review.review_notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let result = sqlx::query(
        r#"
        UPDATE directory_update_requests
        SET status = ?, reviewed_by_id = ?, reviewed_at = ?, review_notes = ?, updated_at = ?
        WHERE id = ? AND organization_id = ? AND status = 'PENDING'
        "#,
    )
    .bind(review.status.as_str())
    .bind(reviewer_id.to_string())
    .bind(now.to_rfc3339())
    .bind(&review_notes)
    .bind(now.to_rfc3339())
    .bind(request_id.to_string())
    .bind(organization_id.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict("directory update request has already been reviewed"));
    }

    if review.status == RequestStatus::Approved {
        apply_changes(&mut tx, organization_id, current.user_id, &current.requested_data).await?;
    }

    let reviewed = fetch_request(&mut tx, organization_id, request_id)
        .await?
        .ok_or_else(|| AppError::internal("reviewed request disappeared"))?;

    tx.commit().await?;

    tracing::info!(
        request_id = %request_id,
        organization_id = %organization_id,
        reviewer_id = %reviewer_id,
        status = %reviewed.status,
        "directory update request reviewed"
    );

    Ok((current, reviewed))
}

fn already_reviewed(status: RequestStatus) -> AppError {
    AppError::conflict(format!("directory update request is already {status}"))
}

async fn apply_changes(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    user_id: Uuid,
    requested_data: &Map<String, Value>,
) -> AppResult<()> {
    let changes = profile_changes(requested_data)?;

    let assignments: Vec<String> = changes.iter().map(|(column, _)| format!("{column} = ?")).collect();
    let sql = format!(
        "UPDATE users SET {}, updated_at = ? WHERE id = ? AND organization_id = ?",
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for (_, value) in &changes {
        query = query.bind(value.clone());
    }
    let result = query
        .bind(utc_now().to_rfc3339())
        .bind(user_id.to_string())
        .bind(organization_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("target user no longer belongs to this organization"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::BuiltInRole;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn changes_map_keys_to_columns() {
        let changes = profile_changes(&data(json!({"unitNumber": "12B", "phone": null}))).unwrap();
        assert!(changes.contains(&("unit_number", Some("12B".to_string()))));
        assert!(changes.contains(&("phone", None)));
    }

    #[test]
    fn empty_or_unknown_fields_rejected() {
        assert!(matches!(profile_changes(&Map::new()), Err(AppError::Validation(_))));
        assert!(matches!(profile_changes(&data(json!({"role": "SUPER_ADMIN"}))), Err(AppError::Validation(_))));
        assert!(matches!(profile_changes(&data(json!({"phone": 5551234}))), Err(AppError::Validation(_))));
    }

    #[test]
    fn snapshot_covers_requested_keys_only() {
        let now = utc_now();
        let user = DbUser {
            id: Uuid::new_v4(),
            organization_id: Some(Uuid::new_v4()),
            email: "ada@example.com".into(),
            password_hash: String::new(),
            role: BuiltInRole::User,
            name: Some("Ada".into()),
            first_name: None,
            last_name: None,
            phone: Some("555".into()),
            unit_number: None,
            created_at: now,
            updated_at: now,
        };

        let snap = snapshot(&user, &data(json!({"unitNumber": "12B", "phone": "556"})));
        assert_eq!(Value::Object(snap), json!({"unitNumber": null, "phone": "555"}));
    }
}
