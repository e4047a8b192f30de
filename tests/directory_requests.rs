mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{seed_organization, seed_user, str_field, TestApp, TestRequest};
use tenant_gate::db::users::fetch_user_by_id;

async fn file_request(t: &TestApp, requester: Uuid, target: Uuid, data: Value) -> Result<(StatusCode, Value)> {
    t.send(
        TestRequest::post("/directory-update-requests")
            .token(&t.token(requester)?)
            .json(json!({"userId": target, "updateType": "profile", "requestedData": data, "reason": "moved units"})),
    )
    .await
}

async fn unit_number(t: &TestApp, user: Uuid) -> Result<Option<String>> {
    Ok(fetch_user_by_id(&t.pool, user)
        .await?
        .context("user missing")?
        .unit_number)
}

#[tokio::test]
async fn approval_applies_requested_fields() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let resident = seed_user(&t.pool, Some(acme), "USER", "resident@acme.test").await?;
    let admin = seed_user(&t.pool, Some(acme), "ADMIN", "admin@acme.test").await?;

    let (status, request) = file_request(&t, resident, resident, json!({"unitNumber": "12B"})).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", request);
    assert_eq!(str_field(&request, "status"), Some("PENDING"));
    assert_eq!(request.pointer("/currentData/unitNumber"), Some(&Value::Null));
    let id = str_field(&request, "id").context("missing id")?.to_string();

    let (status, body) = t
        .send(
            TestRequest::patch(format!("/directory-update-requests/{}", id))
                .token(&t.token(admin)?)
                .json(json!({"status": "APPROVED", "reviewNotes": "ok"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(str_field(&body, "status"), Some("APPROVED"));
    assert_eq!(str_field(&body, "reviewedById"), Some(admin.to_string().as_str()));
    assert!(str_field(&body, "reviewedAt").is_some());

    assert_eq!(unit_number(&t, resident).await?.as_deref(), Some("12B"));
    Ok(())
}

#[tokio::test]
async fn rejection_leaves_profile_and_second_review_conflicts() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let resident = seed_user(&t.pool, Some(acme), "USER", "resident@acme.test").await?;
    let admin = seed_user(&t.pool, Some(acme), "ADMIN", "admin@acme.test").await?;
    let admin_token = t.token(admin)?;

    let (_, request) = file_request(&t, admin, resident, json!({"unitNumber": "12B"})).await?;
    let uri = format!("/directory-update-requests/{}", str_field(&request, "id").context("missing id")?);

    let (status, first) = t
        .send(TestRequest::patch(uri.clone()).token(&admin_token).json(json!({"status": "REJECTED", "reviewNotes": "no"})))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(unit_number(&t, resident).await?, None);

    let (status, _) = t
        .send(TestRequest::patch(uri.clone()).token(&admin_token).json(json!({"status": "APPROVED"})))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listed) = t.send(TestRequest::get("/directory-update-requests").token(&admin_token)).await?;
    let stored = listed
        .as_array()
        .and_then(|items| items.first())
        .cloned()
        .context("request not listed")?;
    assert_eq!(str_field(&stored, "status"), Some("REJECTED"));
    assert_eq!(stored.get("reviewNotes"), first.get("reviewNotes"));
    assert_eq!(stored.get("reviewedAt"), first.get("reviewedAt"));
    assert_eq!(unit_number(&t, resident).await?, None);

    let (status, _) = t
        .send(TestRequest::patch(uri).token(&admin_token).json(json!({"status": "PENDING"})))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn residents_only_file_for_themselves_and_see_their_own() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let other = seed_organization(&t.pool, "other", None).await?;
    let alice = seed_user(&t.pool, Some(acme), "USER", "alice@acme.test").await?;
    let bob = seed_user(&t.pool, Some(acme), "USER", "bob@acme.test").await?;
    let outsider = seed_user(&t.pool, Some(other), "ADMIN", "admin@other.test").await?;

    let (status, _) = file_request(&t, alice, bob, json!({"phone": "555-0199"})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = file_request(&t, outsider, bob, json!({"phone": "555-0199"})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = file_request(&t, alice, alice, json!({"email": "x@y.z"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = file_request(&t, alice, alice, json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = file_request(&t, alice, alice, json!({"phone": "555-0199"})).await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = file_request(&t, bob, bob, json!({"firstName": "Robert"})).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listed) = t.send(TestRequest::get("/directory-update-requests").token(&t.token(alice)?)).await?;
    let requesters: Vec<&str> = listed
        .as_array()
        .map(|items| items.iter().filter_map(|r| str_field(r, "requestedBy")).collect())
        .unwrap_or_default();
    assert_eq!(requesters, vec![alice.to_string().as_str()]);

    let (status, _) = t
        .send(
            TestRequest::patch(format!(
                "/directory-update-requests/{}",
                listed.pointer("/0/id").and_then(Value::as_str).unwrap_or_default()
            ))
            .token(&t.token(bob)?)
            .json(json!({"status": "APPROVED"})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn reviewers_filter_by_status() -> Result<()> {
    let t = TestApp::new().await?;
    let acme = seed_organization(&t.pool, "acme", None).await?;
    let alice = seed_user(&t.pool, Some(acme), "USER", "alice@acme.test").await?;
    let bob = seed_user(&t.pool, Some(acme), "USER", "bob@acme.test").await?;
    let admin = seed_user(&t.pool, Some(acme), "ADMIN", "admin@acme.test").await?;
    let admin_token = t.token(admin)?;

    file_request(&t, alice, alice, json!({"phone": "555-0199"})).await?;
    let (_, request) = file_request(&t, bob, bob, json!({"unitNumber": "7"})).await?;
    t.send(
        TestRequest::patch(format!("/directory-update-requests/{}", str_field(&request, "id").unwrap_or_default()))
            .token(&admin_token)
            .json(json!({"status": "APPROVED"})),
    )
    .await?;

    let (_, all) = t.send(TestRequest::get("/directory-update-requests").token(&admin_token)).await?;
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let (_, pending) = t
        .send(TestRequest::get("/directory-update-requests?status=PENDING").token(&admin_token))
        .await?;
    assert_eq!(pending.as_array().map(Vec::len), Some(1));
    assert_eq!(pending.pointer("/0/userId").and_then(Value::as_str), Some(alice.to_string().as_str()));

    Ok(())
}
