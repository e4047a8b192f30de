use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

/// Certificate state reported by the external issuance pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SslCertificateStatus {
    #[default]
    None,
    Pending,
    Issued,
    Expired,
    Error,
}

impl SslCertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslCertificateStatus::None => "none",
            SslCertificateStatus::Pending => "pending",
            SslCertificateStatus::Issued => "issued",
            SslCertificateStatus::Expired => "expired",
            SslCertificateStatus::Error => "error",
        }
    }
}

impl fmt::Display for SslCertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslCertificateStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SslCertificateStatus::None),
            "pending" => Ok(SslCertificateStatus::Pending),
            "issued" => Ok(SslCertificateStatus::Issued),
            "expired" => Ok(SslCertificateStatus::Expired),
            "error" => Ok(SslCertificateStatus::Error),
            other => Err(AppError::validation(format!("unknown ssl certificate status: {other}"))),
        }
    }
}

/// Where an organization sits in the custom-domain lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainVerificationState {
    Unset,
    PendingVerification,
    Verified,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub domain_verification_token: Option<String>,
    pub domain_verified: bool,
    pub domain_verified_at: Option<DateTime<Utc>>,
    pub ssl_certificate_status: SslCertificateStatus,
    pub ssl_certificate_expiry: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn verification_state(&self) -> DomainVerificationState {
        match (&self.custom_domain, self.domain_verified) {
            (None, _) => DomainVerificationState::Unset,
            (Some(_), false) => DomainVerificationState::PendingVerification,
            (Some(_), true) => DomainVerificationState::Verified,
        }
    }

    pub fn is_routable(&self) -> bool {
        self.is_active && !self.is_suspended
    }
}

impl Loggable for Organization {
    fn entity_type() -> &'static str { "organization" }
    fn subject_id(&self) -> Uuid { self.id }
    fn organization_id(&self) -> Option<Uuid> { Some(self.id) }
    fn severity(&self) -> Severity { Severity::Critical }

    fn severity_for_action(&self, _action: &str) -> Severity { Severity::Critical }
}

/// Domain section of an organization as returned by `/tenants/{id}/domain`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub domain_verification_token: Option<String>,
    pub domain_verified: bool,
    pub domain_verified_at: Option<DateTime<Utc>>,
    pub ssl_certificate_status: SslCertificateStatus,
    pub ssl_certificate_expiry: Option<DateTime<Utc>>,
    pub verification_state: DomainVerificationState,
    #[schema(example = "https://acme.example.com")]
    pub url: String,
}

/// Partial domain update. An absent field is left untouched; an explicit
/// `null` clears it.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainUpdateRequest {
    #[serde(default, deserialize_with = "super::double_option")]
    #[schema(value_type = Option<String>, example = "acme")]
    pub subdomain: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::double_option")]
    #[schema(value_type = Option<String>, example = "portal.acme-hoa.org")]
    pub custom_domain: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTenant {
    pub organization_id: Uuid,
    pub name: String,
    pub slug: String,
    pub source: TenantSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    Subdomain,
    CustomDomain,
}
