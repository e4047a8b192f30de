use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            other => Err(AppError::validation(format!("unknown request status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Profile,
    Contact,
    Household,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Profile => "profile",
            UpdateType::Contact => "contact",
            UpdateType::Household => "household",
        }
    }
}

impl FromStr for UpdateType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(UpdateType::Profile),
            "contact" => Ok(UpdateType::Contact),
            "household" => Ok(UpdateType::Household),
            other => Err(AppError::validation(format!("unknown update type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUpdateRequest {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub requested_by: Uuid,
    pub update_type: UpdateType,
    #[schema(value_type = Object)]
    pub current_data: Option<Map<String, Value>>,
    #[schema(value_type = Object)]
    pub requested_data: Map<String, Value>,
    pub reason: Option<String>,
    pub status: RequestStatus,
    pub reviewed_by_id: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for DirectoryUpdateRequest {
    fn entity_type() -> &'static str { "directory_update_request" }
    fn subject_id(&self) -> Uuid { self.id }
    fn organization_id(&self) -> Option<Uuid> { Some(self.organization_id) }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "approved" => Severity::Critical,
            "created" => Severity::Important,
            _ => self.severity(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectoryUpdateRequest {
    pub user_id: Uuid,
    pub update_type: UpdateType,
    #[schema(value_type = Object, example = json!({"unitNumber": "12B"}))]
    pub requested_data: Map<String, Value>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDirectoryUpdateRequest {
    pub status: RequestStatus,
    pub review_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DirectoryRequestQuery {
    pub status: Option<RequestStatus>,
}
