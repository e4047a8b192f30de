#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use tenant_gate::config::{AppConfig, TenancyConfig};
use tenant_gate::create_app_with_config;
use tenant_gate::db;
use tenant_gate::jwt::JwtConfig;
use tenant_gate::models::rbac::RoleCreateRequest;
use tenant_gate::rbac::roles;
use tenant_gate::utils::{hash_password, utc_now};

pub const APEX: &str = "example.com";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub config: AppConfig,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create tempdir")?;
        let db_path = dir.path().join("test.db");
        let pool = db::connect(&format!("sqlite://{}", db_path.display())).await?;

        let config = AppConfig {
            jwt: JwtConfig::new("test-secret", 24),
            tenancy: TenancyConfig::new(APEX)?,
        };
        let app = create_app_with_config(pool.clone(), config.clone());

        Ok(Self { app, pool, config, _dir: dir })
    }

    pub fn token(&self, user_id: Uuid) -> Result<String> {
        Ok(self.config.jwt.encode(user_id)?)
    }

    pub async fn send(&self, req: TestRequest) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(req.method).uri(req.uri);
        if let Some(host) = req.host {
            builder = builder.header("host", host);
        }
        if let Some(token) = req.token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match req.body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(request).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .with_context(|| format!("non-JSON body: {}", String::from_utf8_lossy(&bytes)))?
        };

        Ok((status, value))
    }
}

pub struct TestRequest {
    method: &'static str,
    uri: String,
    token: Option<String>,
    host: Option<String>,
    body: Option<Value>,
}

impl TestRequest {
    fn new(method: &'static str, uri: impl Into<String>) -> Self {
        Self { method, uri: uri.into(), token: None, host: None, body: None }
    }

    pub fn get(uri: impl Into<String>) -> Self { Self::new("GET", uri) }
    pub fn post(uri: impl Into<String>) -> Self { Self::new("POST", uri) }
    pub fn put(uri: impl Into<String>) -> Self { Self::new("PUT", uri) }
    pub fn patch(uri: impl Into<String>) -> Self { Self::new("PATCH", uri) }
    pub fn delete(uri: impl Into<String>) -> Self { Self::new("DELETE", uri) }

    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub async fn seed_organization(pool: &SqlitePool, slug: &str, subdomain: Option<&str>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now().to_rfc3339();
    sqlx::query(
        "INSERT INTO organizations (id, name, slug, subdomain, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(format!("{} HOA", slug))
    .bind(slug)
    .bind(subdomain)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn seed_user(pool: &SqlitePool, organization_id: Option<Uuid>, role: &str, email: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, organization_id, email, password_hash, role, first_name, phone, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(organization_id.map(|org| org.to_string()))
    .bind(email)
    .bind(hash_password(PASSWORD)?)
    .bind(role)
    .bind("Pat")
    .bind("555-0100")
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Creates a custom role directly in the store and assigns it to `user_id`.
pub async fn grant_custom_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    user_id: Uuid,
    name: &str,
    permission_ids: &[&str],
) -> Result<Uuid> {
    let role_id = Uuid::new_v4();
    let now = utc_now().to_rfc3339();
    sqlx::query("INSERT INTO custom_roles (id, organization_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(role_id.to_string())
        .bind(organization_id.to_string())
        .bind(name)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

    for permission_id in permission_ids {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id, organization_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(role_id.to_string())
            .bind(permission_id)
            .bind(organization_id.to_string())
            .bind(&now)
            .execute(pool)
            .await?;
    }

    sqlx::query("INSERT INTO user_custom_roles (id, user_id, custom_role_id, organization_id, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(organization_id.to_string())
        .bind(&now)
        .execute(pool)
        .await?;

    Ok(role_id)
}

/// Creates a system-owned role the way the administration CLI does.
pub async fn seed_system_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    name: &str,
    permission_ids: &[&str],
) -> Result<Uuid> {
    let payload = RoleCreateRequest {
        name: name.to_string(),
        description: Some("Managed by the platform".to_string()),
        based_on: Some("ADMIN".to_string()),
        permission_ids: permission_ids.iter().map(|id| id.to_string()).collect(),
        organization_id: Some(organization_id),
    };
    let created = roles::create_system_role(pool, organization_id, payload).await?;
    Ok(created.role.id)
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
