use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// The fixed platform role every user holds exactly one of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuiltInRole {
    User,
    Admin,
    SuperAdmin,
}

impl BuiltInRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltInRole::User => "USER",
            BuiltInRole::Admin => "ADMIN",
            BuiltInRole::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// ADMIN or SUPER_ADMIN.
    pub fn is_admin(&self) -> bool {
        matches!(self, BuiltInRole::Admin | BuiltInRole::SuperAdmin)
    }
}

impl fmt::Display for BuiltInRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltInRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(BuiltInRole::User),
            "ADMIN" => Ok(BuiltInRole::Admin),
            "SUPER_ADMIN" => Ok(BuiltInRole::SuperAdmin),
            other => Err(AppError::validation(format!("unknown built-in role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub email: String,
    pub role: BuiltInRole,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub unit_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DbUser {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub email: String,
    pub password_hash: String,
    pub role: BuiltInRole,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub unit_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(value: DbUser) -> Self {
        User {
            id: value.id,
            organization_id: value.organization_id,
            email: value.email,
            role: value.role,
            name: value.name,
            first_name: value.first_name,
            last_name: value.last_name,
            phone: value.phone,
            unit_number: value.unit_number,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}
