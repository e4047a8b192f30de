mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::Value;

use common::{grant_custom_role, seed_organization, seed_user, TestApp, TestRequest};
use tenant_gate::rbac::{effective_permissions, PermissionCatalog};

fn permissions(body: &Value) -> Vec<String> {
    body.get("permissions")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn super_admin_holds_the_universe_everywhere() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let other = seed_organization(&t.pool, "other", None).await?;
    let root = seed_user(&t.pool, None, "SUPER_ADMIN", "root@example.com").await?;

    for org in [acme, other] {
        let grant = effective_permissions(&t.pool, root, org).await?;
        assert_eq!(&grant.permissions, PermissionCatalog::global().universe());
    }

    Ok(())
}

#[tokio::test]
async fn custom_role_applies_only_in_its_organization() -> Result<()> {
    let t = TestApp::new().await?;
    let x = seed_organization(&t.pool, "x", None).await?;
    let y = seed_organization(&t.pool, "y", None).await?;
    let root = seed_user(&t.pool, None, "SUPER_ADMIN", "root@example.com").await?;
    let member = seed_user(&t.pool, Some(x), "USER", "member@x.test").await?;
    grant_custom_role(&t.pool, x, member, "Treasurer", &["perm_payment_view", "perm_payment_edit"]).await?;

    let token = t.token(root)?;

    let (status, body) = t
        .send(TestRequest::get(format!("/users/{}/effective-permissions", member)).token(&token))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let keys = permissions(&body);
    assert!(keys.contains(&"payments:view".to_string()), "{:?}", keys);
    assert!(keys.contains(&"payments:edit".to_string()));
    assert!(keys.contains(&"directory:view".to_string()));
    assert_eq!(body.get("customRoles"), Some(&serde_json::json!(["Treasurer"])));

    let (status, body) = t
        .send(TestRequest::get(format!("/users/{}/effective-permissions?organizationId={}", member, y)).token(&token))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let keys = permissions(&body);
    assert!(!keys.iter().any(|k| k.starts_with("payments:")), "{:?}", keys);

    Ok(())
}

#[tokio::test]
async fn foreign_role_rows_never_leak_into_another_organization() -> Result<()> {
    let t = TestApp::new().await?;
    let x = seed_organization(&t.pool, "x", None).await?;
    let y = seed_organization(&t.pool, "y", None).await?;
    let member = seed_user(&t.pool, Some(x), "USER", "member@x.test").await?;
    // assignment row claims org x but the role lives in org y
    let role = grant_custom_role(&t.pool, y, member, "Smuggled", &["perm_budget_edit"]).await?;
    sqlx::query("UPDATE user_custom_roles SET organization_id = ? WHERE custom_role_id = ?")
        .bind(x.to_string())
        .bind(role.to_string())
        .execute(&t.pool)
        .await?;

    let grant = effective_permissions(&t.pool, member, x).await?;
    assert!(!grant.permissions.contains("budget", "edit"));
    assert!(grant.custom_roles.is_empty());

    Ok(())
}

#[tokio::test]
async fn plain_users_cannot_inspect_others() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let user = seed_user(&t.pool, Some(acme), "USER", "user@acme.test").await?;
    let admin = seed_user(&t.pool, Some(acme), "ADMIN", "admin@acme.test").await?;

    let (status, _) = t
        .send(TestRequest::get(format!("/users/{}/effective-permissions", admin)).token(&t.token(user)?))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .send(TestRequest::get(format!("/users/{}/effective-permissions", user)).token(&t.token(admin)?))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("builtInRole"), Some(&serde_json::json!("USER")));
    assert!(!permissions(&body).contains(&"roles:create".to_string()));

    Ok(())
}

#[tokio::test]
async fn catalog_is_listed_by_category() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let user = seed_user(&t.pool, Some(acme), "USER", "user@acme.test").await?;

    let (status, body) = t.send(TestRequest::get("/permissions").token(&t.token(user)?)).await?;
    assert_eq!(status, StatusCode::OK);

    let total: usize = body
        .as_array()
        .map(|cats| {
            cats.iter()
                .filter_map(|c| c.get("permissions").and_then(Value::as_array))
                .map(Vec::len)
                .sum()
        })
        .unwrap_or_default();
    assert_eq!(total, PermissionCatalog::global().all().count());

    Ok(())
}
