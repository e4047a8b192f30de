use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::row_parsers::db_user_from_row;
use crate::errors::AppResult;
use crate::models::user::DbUser;

const USER_COLUMNS: &str = "id, organization_id, email, password_hash, role, name, first_name, last_name, phone, unit_number, created_at, updated_at";

/// Loads a user by id alone. Only for authenticating the caller or for
/// discovering which organization a target record belongs to.
pub async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_user_from_row).transpose()
}

pub async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let row = sqlx::query(&sql)
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_user_from_row).transpose()
}

pub async fn fetch_user_in_organization(
    pool: &SqlitePool,
    user_id: Uuid,
    organization_id: Uuid,
) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND organization_id = ?");
    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(db_user_from_row).transpose()
}
