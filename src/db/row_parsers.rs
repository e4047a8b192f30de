use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::directory::DirectoryUpdateRequest;
use crate::models::organization::Organization;
use crate::models::rbac::{CustomRole, UserCustomRole};
use crate::models::user::DbUser;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format, with optional fractional seconds
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

pub fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, AppError> {
    let s: String = get(row, column)?;
    parse_uuid(&s)
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, AppError> {
    let s: Option<String> = get(row, column)?;
    s.as_deref().map(parse_uuid).transpose()
}

fn get_datetime(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, AppError> {
    let s: String = get(row, column)?;
    parse_datetime(&s)
}

fn parse_json_object(s: &str) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::internal("stored JSON is not an object")),
        Err(e) => Err(AppError::internal(format!("invalid stored JSON: {}", e))),
    }
}

pub fn organization_from_row(row: &SqliteRow) -> Result<Organization, AppError> {
    let ssl_status: String = get(row, "ssl_certificate_status")?;

    Ok(Organization {
        id: get_uuid(row, "id")?,
        name: get(row, "name")?,
        slug: get(row, "slug")?,
        subdomain: get(row, "subdomain")?,
        custom_domain: get(row, "custom_domain")?,
        domain_verification_token: get(row, "domain_verification_token")?,
        domain_verified: get(row, "domain_verified")?,
        domain_verified_at: parse_opt_datetime(get(row, "domain_verified_at")?)?,
        ssl_certificate_status: ssl_status
            .parse()
            .map_err(|_| AppError::internal(format!("invalid ssl_certificate_status: {}", ssl_status)))?,
        ssl_certificate_expiry: parse_opt_datetime(get(row, "ssl_certificate_expiry")?)?,
        is_active: get(row, "is_active")?,
        is_suspended: get(row, "is_suspended")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let role: String = get(row, "role")?;

    Ok(DbUser {
        id: get_uuid(row, "id")?,
        organization_id: get_opt_uuid(row, "organization_id")?,
        email: get(row, "email")?,
        password_hash: get(row, "password_hash")?,
        role: role
            .parse()
            .map_err(|_| AppError::internal(format!("invalid role: {}", role)))?,
        name: get(row, "name")?,
        first_name: get(row, "first_name")?,
        last_name: get(row, "last_name")?,
        phone: get(row, "phone")?,
        unit_number: get(row, "unit_number")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn custom_role_from_row(row: &SqliteRow) -> Result<CustomRole, AppError> {
    Ok(CustomRole {
        id: get_uuid(row, "id")?,
        organization_id: get_uuid(row, "organization_id")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        based_on: get(row, "based_on")?,
        is_system: get(row, "is_system")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn user_custom_role_from_row(row: &SqliteRow) -> Result<UserCustomRole, AppError> {
    Ok(UserCustomRole {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        custom_role_id: get_uuid(row, "custom_role_id")?,
        organization_id: get_uuid(row, "organization_id")?,
        assigned_by: get_opt_uuid(row, "assigned_by")?,
        created_at: get_datetime(row, "created_at")?,
    })
}

pub fn directory_request_from_row(row: &SqliteRow) -> Result<DirectoryUpdateRequest, AppError> {
    let update_type: String = get(row, "update_type")?;
    let status: String = get(row, "status")?;
    let current_data: Option<String> = get(row, "current_data")?;
    let requested_data: String = get(row, "requested_data")?;

    Ok(DirectoryUpdateRequest {
        id: get_uuid(row, "id")?,
        organization_id: get_uuid(row, "organization_id")?,
        user_id: get_uuid(row, "user_id")?,
        requested_by: get_uuid(row, "requested_by")?,
        update_type: update_type
            .parse()
            .map_err(|_| AppError::internal(format!("invalid update_type: {}", update_type)))?,
        current_data: current_data.as_deref().map(parse_json_object).transpose()?,
        requested_data: parse_json_object(&requested_data)?,
        reason: get(row, "reason")?,
        status: status
            .parse()
            .map_err(|_| AppError::internal(format!("invalid status: {}", status)))?,
        reviewed_by_id: get_opt_uuid(row, "reviewed_by_id")?,
        reviewed_at: parse_opt_datetime(get(row, "reviewed_at")?)?,
        review_notes: get(row, "review_notes")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}
