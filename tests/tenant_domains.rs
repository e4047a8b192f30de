mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{seed_organization, seed_user, str_field, TestApp, TestRequest};
use tenant_gate::models::organization::SslCertificateStatus;
use tenant_gate::tenant::{domain, resolve};

#[tokio::test]
async fn duplicate_subdomain_is_rejected_and_host_resolves_to_owner() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let other = seed_organization(&t.pool, "other", None).await?;
    let root = seed_user(&t.pool, None, "SUPER_ADMIN", "root@example.com").await?;
    let token = t.token(root)?;

    let (status, body) = t
        .send(TestRequest::put(format!("/tenants/{}/domain", acme)).token(&token).json(json!({"subdomain": "acme"})))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(str_field(&body, "url"), Some("https://acme.example.com"));

    let (status, body) = t
        .send(TestRequest::put(format!("/tenants/{}/domain", other)).token(&token).json(json!({"subdomain": "acme"})))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(str_field(&body, "error"), Some("conflict"));

    let (status, body) = t.send(TestRequest::get("/tenant").host("acme.example.com")).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(str_field(&body, "organizationId"), Some(acme.to_string().as_str()));
    assert_eq!(str_field(&body, "source"), Some("subdomain"));

    Ok(())
}

#[tokio::test]
async fn platform_and_dev_hosts_resolve_to_no_tenant() -> Result<()> {
    let t = TestApp::new().await?;
    seed_organization(&t.pool, "www-owner", Some("www1")).await?;

    for host in ["example.com", "www.example.com", "localhost:3000", "127.0.0.1", "unknown.example.com"] {
        assert!(resolve(&t.pool, &t.config.tenancy, host).await?.is_none(), "{host} resolved");
        let (status, _) = t.send(TestRequest::get("/tenant").host(host)).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{host}");
    }

    Ok(())
}

#[tokio::test]
async fn invalid_and_reserved_subdomains_are_validation_errors() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let root = seed_user(&t.pool, None, "SUPER_ADMIN", "root@example.com").await?;
    let token = t.token(root)?;

    for subdomain in ["admin", "Acme", "ab", "-acme", "acme-", "ac_me"] {
        let (status, body) = t
            .send(TestRequest::put(format!("/tenants/{}/domain", acme)).token(&token).json(json!({"subdomain": subdomain})))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{subdomain}: {body}");
    }

    let (status, _) = t
        .send(
            TestRequest::put(format!("/tenants/{}/domain", acme))
                .token(&token)
                .json(json!({"customDomain": "portal.example.com"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn custom_domain_lifecycle_resets_to_defaults() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", Some("acme")).await?;
    let root = seed_user(&t.pool, None, "SUPER_ADMIN", "root@example.com").await?;
    let token = t.token(root)?;

    let (status, body) = t
        .send(
            TestRequest::put(format!("/tenants/{}/domain", acme))
                .token(&token)
                .json(json!({"customDomain": "Portal.Acme-HOA.org"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(str_field(&body, "customDomain"), Some("portal.acme-hoa.org"));
    assert_eq!(str_field(&body, "verificationState"), Some("PENDING_VERIFICATION"));
    let token_value = str_field(&body, "domainVerificationToken").unwrap_or_default();
    assert!(token_value.starts_with(domain::VERIFICATION_TOKEN_PREFIX), "{}", token_value);
    // unverified custom domains are not used for the canonical URL or routing
    assert_eq!(str_field(&body, "url"), Some("https://acme.example.com"));
    assert!(resolve(&t.pool, &t.config.tenancy, "portal.acme-hoa.org").await?.is_none());

    domain::mark_domain_verified(&t.pool, acme).await?;
    domain::set_ssl_status(&t.pool, acme, SslCertificateStatus::Issued, None).await?;

    let resolved = resolve(&t.pool, &t.config.tenancy, "portal.acme-hoa.org:443").await?;
    assert_eq!(resolved.map(|r| r.organization_id), Some(acme));

    let (status, body) = t.send(TestRequest::delete(format!("/tenants/{}/domain", acme)).token(&token)).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body.get("customDomain"), Some(&Value::Null));
    assert_eq!(body.get("domainVerificationToken"), Some(&Value::Null));
    assert_eq!(body.get("domainVerified"), Some(&json!(false)));
    assert_eq!(body.get("domainVerifiedAt"), Some(&Value::Null));
    assert_eq!(str_field(&body, "sslCertificateStatus"), Some("none"));
    assert_eq!(body.get("sslCertificateExpiry"), Some(&Value::Null));
    assert_eq!(str_field(&body, "subdomain"), Some("acme"));

    Ok(())
}

#[tokio::test]
async fn duplicate_custom_domain_is_conflict() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let other = seed_organization(&t.pool, "other", None).await?;
    let root = seed_user(&t.pool, None, "SUPER_ADMIN", "root@example.com").await?;
    let token = t.token(root)?;

    let body = json!({"customDomain": "portal.acme-hoa.org"});
    let (status, _) = t
        .send(TestRequest::put(format!("/tenants/{}/domain", acme)).token(&token).json(body.clone()))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .send(TestRequest::put(format!("/tenants/{}/domain", other)).token(&token).json(body))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn domain_management_requires_organization_manage() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let other = seed_organization(&t.pool, "other", None).await?;
    let admin = seed_user(&t.pool, Some(acme), "ADMIN", "admin@acme.test").await?;
    let manager = seed_user(&t.pool, Some(acme), "USER", "manager@acme.test").await?;
    common::grant_custom_role(&t.pool, acme, manager, "Site Manager", &["perm_org_manage"]).await?;

    let (status, _) = t
        .send(TestRequest::get(format!("/tenants/{}/domain", acme)).token(&t.token(admin)?))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let manager_token = t.token(manager)?;
    let (status, _) = t.send(TestRequest::get(format!("/tenants/{}/domain", acme)).token(&manager_token)).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.send(TestRequest::get(format!("/tenants/{}/domain", other)).token(&manager_token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.send(TestRequest::get(format!("/tenants/{}/domain", acme))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn suspended_organization_does_not_resolve() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", Some("acme")).await?;
    sqlx::query("UPDATE organizations SET is_suspended = 1 WHERE id = ?")
        .bind(acme.to_string())
        .execute(&t.pool)
        .await?;

    assert!(resolve(&t.pool, &t.config.tenancy, "acme.example.com").await?.is_none());
    Ok(())
}
