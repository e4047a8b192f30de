use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::errors::AppResult;

pub mod row_parsers;
pub mod users;

pub async fn init() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    connect(&database_url).await
}

/// Opens a pool with foreign keys enforced and applies pending migrations.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(pool)
}

/// Takes the write lock for the enclosing transaction by touching one row.
///
/// Run it as the first statement after `begin()`. SQLite will not wait on the
/// busy timeout when a transaction that has already read tries to start
/// writing, so a racing writer would fail with `SQLITE_BUSY` instead of
/// queueing. Returns whether the row exists.
pub async fn lock_row(conn: &mut SqliteConnection, table: &'static str, id: Uuid) -> AppResult<bool> {
    let sql = format!("UPDATE {table} SET updated_at = updated_at WHERE id = ?");
    let result = sqlx::query(&sql).bind(id.to_string()).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}
