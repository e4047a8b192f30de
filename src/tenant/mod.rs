//! Host header to organization resolution.

pub mod domain;
pub mod validation;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use sqlx::{Row, SqlitePool};

use crate::app::AppState;
use crate::config::TenancyConfig;
use crate::db::row_parsers::parse_uuid;
use crate::errors::{AppError, AppResult};
use crate::models::organization::{ResolvedTenant, TenantSource};

/// What a host points at before any store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTarget {
    Platform,
    /// Try `host` as a verified custom domain first, then `subdomain` if any.
    Tenant { host: String, subdomain: Option<String> },
}

/// Lowercases the host and strips the port. `None` for anything that is not
/// a plain hostname, IPv4 address or bare IPv6 address.
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('[') {
        return None;
    }

    let host = match raw.matches(':').count() {
        0 => raw,
        1 => {
            let (host, port) = raw.split_once(':')?;
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            host
        }
        // bare IPv6, no port possible
        _ => return Some(raw.to_ascii_lowercase()),
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let well_formed = !host.is_empty()
        && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !host.split('.').any(str::is_empty);

    well_formed.then_some(host)
}

pub fn classify(config: &TenancyConfig, raw_host: &str) -> HostTarget {
    let Some(host) = normalize_host(raw_host) else {
        return HostTarget::Platform;
    };

    if config.is_platform_host(&host) || config.is_dev_host(&host) || host.contains(':') {
        return HostTarget::Platform;
    }

    let subdomain = host
        .strip_suffix(config.apex_domain.as_str())
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|label| !label.is_empty() && !label.contains('.'))
        .map(str::to_string);

    if subdomain.as_deref() == Some("www") {
        return HostTarget::Platform;
    }

    HostTarget::Tenant { host, subdomain }
}

async fn lookup(
    pool: &SqlitePool,
    predicate: &str,
    value: &str,
    source: TenantSource,
) -> AppResult<Option<ResolvedTenant>> {
    let sql = format!(
        "SELECT id, name, slug FROM organizations WHERE {predicate} AND is_active = 1 AND is_suspended = 0 LIMIT 2"
    );
    let rows = sqlx::query(&sql).bind(value).fetch_all(pool).await?;

    match rows.as_slice() {
        [] => Ok(None),
        [row] => {
            let id: String = row.try_get("id")?;
            Ok(Some(ResolvedTenant {
                organization_id: parse_uuid(&id)?,
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                source,
            }))
        }
        _ => Err(AppError::configuration(format!(
            "host value '{value}' matches more than one organization"
        ))),
    }
}

/// Maps a Host header to the organization it serves, or `None` for the
/// platform itself, unknown hosts and inactive or suspended organizations.
pub async fn resolve(pool: &SqlitePool, config: &TenancyConfig, raw_host: &str) -> AppResult<Option<ResolvedTenant>> {
    let HostTarget::Tenant { host, subdomain } = classify(config, raw_host) else {
        return Ok(None);
    };

    if let Some(tenant) = lookup(pool, "custom_domain = ? AND domain_verified = 1", &host, TenantSource::CustomDomain).await? {
        return Ok(Some(tenant));
    }

    match subdomain {
        Some(label) => lookup(pool, "subdomain = ?", &label, TenantSource::Subdomain).await,
        None => Ok(None),
    }
}

/// The tenant the request's Host header resolves to, if any.
#[derive(Debug, Clone)]
pub struct RequestTenant(pub Option<ResolvedTenant>);

#[axum::async_trait]
impl FromRequestParts<AppState> for RequestTenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| parts.uri.host())
            .map(str::to_string);

        let tenant = match host {
            Some(host) => resolve(&state.pool, &state.config.tenancy, &host).await?,
            None => None,
        };

        if let Some(tenant) = &tenant {
            tracing::debug!(organization_id = %tenant.organization_id, source = ?tenant.source, "tenant resolved");
        }

        Ok(RequestTenant(tenant))
    }
}
