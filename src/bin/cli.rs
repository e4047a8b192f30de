use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use tenant_gate::db;
use tenant_gate::rbac::roles;
use tenant_gate::models::organization::SslCertificateStatus;
use tenant_gate::models::rbac::RoleCreateRequest;
use tenant_gate::models::user::BuiltInRole;
use tenant_gate::tenant::{domain, validation};
use tenant_gate::utils::{hash_password, utc_now};

#[derive(Parser, Debug)]
#[command(author, version, about = "tenant-gate administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create an organization, optionally claiming a subdomain
    CreateOrganization {
        name: String,
        slug: String,
        #[arg(long)]
        subdomain: Option<String>,
    },
    /// Create a user with a built-in role
    CreateUser {
        email: String,
        password: String,
        #[arg(long, default_value = "USER")]
        role: String,
        #[arg(long)]
        organization_id: Option<Uuid>,
    },
    /// Create a system role: readable and assignable, but locked against API edits
    CreateSystemRole {
        organization_id: Uuid,
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Permission id from the catalog; repeat for several
        #[arg(long = "permission")]
        permission_ids: Vec<String>,
    },
    /// Record that the organization's custom domain passed DNS verification
    MarkDomainVerified { organization_id: Uuid },
    /// Record a certificate status reported by the SSL pipeline
    SetSslStatus {
        organization_id: Uuid,
        /// none, pending, issued, expired or error
        status: String,
        /// RFC 3339 expiry timestamp
        #[arg(long)]
        expiry: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CreateOrganization { name, slug, subdomain } => {
            let pool = db::init().await?;
            let id = create_organization(&pool, &name, &slug, subdomain.as_deref()).await?;
            println!("Created organization {} ({})", slug, id);
        }
        Commands::CreateUser { email, password, role, organization_id } => {
            let pool = db::init().await?;
            let role: BuiltInRole = role.parse()?;
            let id = create_user(&pool, &email, &password, role, organization_id).await?;
            println!("Created user {} ({})", email.trim().to_lowercase(), id);
        }
        Commands::CreateSystemRole { organization_id, name, description, permission_ids } => {
            let pool = db::init().await?;
            let payload = RoleCreateRequest {
                name,
                description,
                based_on: None,
                permission_ids,
                organization_id: Some(organization_id),
            };
            let created = roles::create_system_role(&pool, organization_id, payload).await?;
            println!(
                "Created system role {} ({}) with {} permission(s)",
                created.role.name,
                created.role.id,
                created.permissions.len()
            );
        }
        Commands::MarkDomainVerified { organization_id } => {
            let pool = db::init().await?;
            let (_, organization) = domain::mark_domain_verified(&pool, organization_id).await?;
            println!(
                "Verified {} for {}",
                organization.custom_domain.unwrap_or_default(),
                organization.slug
            );
        }
        Commands::SetSslStatus { organization_id, status, expiry } => {
            let pool = db::init().await?;
            let status: SslCertificateStatus = status.parse()?;
            let (_, organization) = domain::set_ssl_status(&pool, organization_id, status, expiry).await?;
            println!("SSL status of {} is now {}", organization.slug, organization.ssl_certificate_status);
        }
    }

    Ok(())
}

async fn create_organization(
    pool: &SqlitePool,
    name: &str,
    slug: &str,
    subdomain: Option<&str>,
) -> anyhow::Result<Uuid> {
    if let Some(subdomain) = subdomain {
        let check = validation::validate_subdomain(subdomain);
        if !check.valid {
            anyhow::bail!("invalid subdomain: {}", check.error.unwrap_or_default());
        }
    }

    let id = Uuid::new_v4();
    let now = utc_now().to_rfc3339();
    sqlx::query(
        "INSERT INTO organizations (id, name, slug, subdomain, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name.trim())
    .bind(slug.trim())
    .bind(subdomain)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .context("failed to insert organization")?;

    Ok(id)
}

async fn create_user(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    role: BuiltInRole,
    organization_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    if organization_id.is_none() && role != BuiltInRole::SuperAdmin {
        anyhow::bail!("--organization-id is required unless the role is SUPER_ADMIN");
    }

    let id = Uuid::new_v4();
    let now = utc_now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, organization_id, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(organization_id.map(|org| org.to_string()))
    .bind(email.trim().to_lowercase())
    .bind(hash_password(password)?)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .context("failed to insert user")?;

    Ok(id)
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if has_table.is_some() {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", display))
}
