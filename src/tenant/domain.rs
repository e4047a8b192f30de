//! Custom-domain lifecycle: `UNSET -> PENDING_VERIFICATION -> VERIFIED`, with
//! SSL status tracked alongside once a domain is verified.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;

use crate::config::TenancyConfig;
use crate::db;
use crate::db::row_parsers::organization_from_row;
use crate::errors::{unique_violation_as_conflict, AppError, AppResult};
use crate::models::organization::{DomainConfig, DomainUpdateRequest, Organization, SslCertificateStatus};
use crate::tenant::validation::{normalize_custom_domain, validate_custom_domain, validate_subdomain};
use crate::utils::{random_alphanumeric, utc_now};

pub const VERIFICATION_TOKEN_PREFIX: &str = "tenant-verify-";
const TOKEN_SEGMENT_LEN: usize = 13;

const SUBDOMAIN_TAKEN: &str = "Subdomain is already taken";
const CUSTOM_DOMAIN_TAKEN: &str = "Custom domain is already in use";

const ORGANIZATION_COLUMNS: &str = "id, name, slug, subdomain, custom_domain, domain_verification_token, domain_verified, domain_verified_at, ssl_certificate_status, ssl_certificate_expiry, is_active, is_suspended, created_at, updated_at";

/// Value expected in the TXT record at the custom domain.
pub fn generate_verification_token() -> String {
    format!(
        "{VERIFICATION_TOKEN_PREFIX}{}{}",
        random_alphanumeric(TOKEN_SEGMENT_LEN),
        random_alphanumeric(TOKEN_SEGMENT_LEN)
    )
}

/// Canonical URL of a tenant. A custom domain is only used once verified.
pub fn tenant_url(config: &TenancyConfig, organization: &Organization) -> String {
    match (&organization.custom_domain, &organization.subdomain) {
        (Some(custom), _) if organization.domain_verified => format!("https://{custom}"),
        (_, Some(subdomain)) => format!("https://{subdomain}.{}", config.apex_domain),
        _ => format!("https://{}", config.apex_domain),
    }
}

pub fn domain_config(config: &TenancyConfig, organization: &Organization) -> DomainConfig {
    DomainConfig {
        id: organization.id,
        name: organization.name.clone(),
        slug: organization.slug.clone(),
        subdomain: organization.subdomain.clone(),
        custom_domain: organization.custom_domain.clone(),
        domain_verification_token: organization.domain_verification_token.clone(),
        domain_verified: organization.domain_verified,
        domain_verified_at: organization.domain_verified_at,
        ssl_certificate_status: organization.ssl_certificate_status,
        ssl_certificate_expiry: organization.ssl_certificate_expiry,
        verification_state: organization.verification_state(),
        url: tenant_url(config, organization),
    }
}

/// A domain update that passed validation. Outer `None` leaves a field alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainChange {
    pub subdomain: Option<Option<String>>,
    pub custom_domain: Option<Option<String>>,
}

impl DomainChange {
    pub fn validate(request: DomainUpdateRequest, config: &TenancyConfig) -> AppResult<Self> {
        if let Some(Some(subdomain)) = &request.subdomain {
            let outcome = validate_subdomain(subdomain);
            if !outcome.valid {
                return Err(AppError::validation(outcome.error.unwrap_or_default()));
            }
        }

        let custom_domain = match request.custom_domain {
            Some(Some(domain)) => {
                let outcome = validate_custom_domain(&domain, &config.apex_domain);
                if !outcome.valid {
                    return Err(AppError::validation(outcome.error.unwrap_or_default()));
                }
                Some(Some(normalize_custom_domain(&domain)))
            }
            other => other,
        };

        Ok(Self {
            subdomain: request.subdomain,
            custom_domain,
        })
    }

    pub fn clear_custom_domain() -> Self {
        Self {
            subdomain: None,
            custom_domain: Some(None),
        }
    }

    /// Returns `organization` with the change applied. Setting a custom domain
    /// restarts verification with `token`; clearing it wipes every
    /// verification and SSL field. The subdomain is independent of both.
    pub fn apply(&self, organization: &Organization, token: String, now: DateTime<Utc>) -> Organization {
        let mut next = organization.clone();

        if let Some(subdomain) = &self.subdomain {
            next.subdomain = subdomain.clone();
        }

        if let Some(custom_domain) = &self.custom_domain {
            next.custom_domain = custom_domain.clone();
            next.domain_verification_token = custom_domain.as_ref().map(|_| token);
            next.domain_verified = false;
            next.domain_verified_at = None;
            next.ssl_certificate_status = SslCertificateStatus::None;
            next.ssl_certificate_expiry = None;
        }

        next.updated_at = now;
        next
    }
}

async fn fetch_organization_in(conn: &mut SqliteConnection, organization_id: Uuid) -> AppResult<Organization> {
    let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(organization_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))?;

    organization_from_row(&row)
}

pub async fn fetch_organization(pool: &SqlitePool, organization_id: Uuid) -> AppResult<Organization> {
    let mut conn = pool.acquire().await?;
    fetch_organization_in(&mut conn, organization_id).await
}

/// Opens a write-locked transaction and loads the organization under it.
/// Concurrent domain writers queue on the lock, so the second one sees the
/// first one's committed state.
async fn lock_organization(
    pool: &SqlitePool,
    organization_id: Uuid,
) -> AppResult<(Transaction<'static, Sqlite>, Organization)> {
    let mut tx = pool.begin().await?;
    if !db::lock_row(&mut tx, "organizations", organization_id).await? {
        return Err(AppError::not_found("organization not found"));
    }
    let current = fetch_organization_in(&mut tx, organization_id).await?;
    Ok((tx, current))
}

async fn ensure_unclaimed(
    conn: &mut SqliteConnection,
    column: &str,
    value: &str,
    organization_id: Uuid,
    message: &str,
) -> AppResult<()> {
    let sql = format!("SELECT id FROM organizations WHERE {column} = ? AND id != ?");
    let holder: Option<String> = sqlx::query_scalar(&sql)
        .bind(value)
        .bind(organization_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    match holder {
        Some(_) => Err(AppError::conflict(message)),
        None => Ok(()),
    }
}

async fn write_domain_fields(conn: &mut SqliteConnection, organization: &Organization) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE organizations
        SET subdomain = ?, custom_domain = ?, domain_verification_token = ?, domain_verified = ?,
            domain_verified_at = ?, ssl_certificate_status = ?, ssl_certificate_expiry = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&organization.subdomain)
    .bind(&organization.custom_domain)
    .bind(&organization.domain_verification_token)
    .bind(organization.domain_verified)
    .bind(organization.domain_verified_at.map(|at| at.to_rfc3339()))
    .bind(organization.ssl_certificate_status.as_str())
    .bind(organization.ssl_certificate_expiry.map(|at| at.to_rfc3339()))
    .bind(organization.updated_at.to_rfc3339())
    .bind(organization.id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| match unique_violation_as_conflict(e, "organizations.subdomain", SUBDOMAIN_TAKEN) {
        AppError::Database(e) => unique_violation_as_conflict(e, "organizations.custom_domain", CUSTOM_DOMAIN_TAKEN),
        other => other,
    })?;

    Ok(())
}

/// Applies a validated change and returns the organization before and after.
///
/// The uniqueness pre-check and the write share a write-locked transaction.
/// A claim that slips past the pre-check is still caught by the unique
/// columns and reported with the same conflict.
pub async fn update_domain(
    pool: &SqlitePool,
    organization_id: Uuid,
    change: DomainChange,
) -> AppResult<(Organization, Organization)> {
    let (mut tx, current) = lock_organization(pool, organization_id).await?;

    if let Some(Some(subdomain)) = &change.subdomain {
        ensure_unclaimed(&mut tx, "subdomain", subdomain, organization_id, SUBDOMAIN_TAKEN).await?;
    }
    if let Some(Some(custom_domain)) = &change.custom_domain {
        ensure_unclaimed(&mut tx, "custom_domain", custom_domain, organization_id, CUSTOM_DOMAIN_TAKEN).await?;
    }

    let next = change.apply(&current, generate_verification_token(), utc_now());
    write_domain_fields(&mut tx, &next).await?;

    tx.commit().await?;

    tracing::info!(
        organization_id = %organization_id,
        subdomain = ?next.subdomain,
        custom_domain = ?next.custom_domain,
        "domain configuration updated"
    );

    Ok((current, next))
}

pub async fn clear_custom_domain(pool: &SqlitePool, organization_id: Uuid) -> AppResult<(Organization, Organization)> {
    update_domain(pool, organization_id, DomainChange::clear_custom_domain()).await
}

/// Records a successful out-of-band ownership check. The write is conditioned
/// on the custom domain still being the one that was checked.
pub async fn mark_domain_verified(pool: &SqlitePool, organization_id: Uuid) -> AppResult<(Organization, Organization)> {
    let (mut tx, current) = lock_organization(pool, organization_id).await?;
    let custom_domain = current
        .custom_domain
        .clone()
        .ok_or_else(|| AppError::validation("organization has no custom domain to verify"))?;

    let now = utc_now();
    let result = sqlx::query(
        "UPDATE organizations SET domain_verified = 1, domain_verified_at = ?, updated_at = ? WHERE id = ? AND custom_domain = ?",
    )
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .bind(organization_id.to_string())
    .bind(&custom_domain)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict("custom domain changed while it was being verified"));
    }

    let next = fetch_organization_in(&mut tx, organization_id).await?;
    tx.commit().await?;

    tracing::info!(organization_id = %organization_id, custom_domain = %custom_domain, "custom domain verified");
    Ok((current, next))
}

/// Records a report from the certificate pipeline. Anything other than `none`
/// requires a verified custom domain.
pub async fn set_ssl_status(
    pool: &SqlitePool,
    organization_id: Uuid,
    status: SslCertificateStatus,
    expiry: Option<DateTime<Utc>>,
) -> AppResult<(Organization, Organization)> {
    let (mut tx, current) = lock_organization(pool, organization_id).await?;
    if status != SslCertificateStatus::None && !current.domain_verified {
        return Err(AppError::validation("custom domain is not verified"));
    }

    sqlx::query(
        "UPDATE organizations SET ssl_certificate_status = ?, ssl_certificate_expiry = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(expiry.map(|at| at.to_rfc3339()))
    .bind(utc_now().to_rfc3339())
    .bind(organization_id.to_string())
    .execute(&mut *tx)
    .await?;

    let next = fetch_organization_in(&mut tx, organization_id).await?;
    tx.commit().await?;

    tracing::info!(organization_id = %organization_id, status = %status, "ssl certificate status updated");
    Ok((current, next))
}
