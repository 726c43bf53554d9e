//! Integration-style handler tests for the core auth and tenancy flows.
//!
//! These tests exercise the full router against a real Postgres database.
//! Set `HORIZON_TEST_DSN` to a scratch database to run them; without it each
//! test prints a skip notice and passes. The schema is re-applied from
//! `sql/schema.sql` at the start of every test.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Request, StatusCode,
    },
    Extension, Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tower::ServiceExt;

use crate::api::handlers::auth::{AuthConfig, AuthState};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

struct TestDb {
    pool: PgPool,
}

impl TestDb {
    /// Connect to the scratch database named by `HORIZON_TEST_DSN` and apply
    /// a fresh schema. Errors (including an unset variable) let callers skip.
    async fn new() -> Result<Self> {
        let dsn = std::env::var("HORIZON_TEST_DSN")
            .context("HORIZON_TEST_DSN not set; skipping integration test")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&dsn)
            .await
            .context("failed to connect test pool")?;

        reset_schema(&pool).await?;

        Ok(Self { pool })
    }
}

/// Drop and re-create the public schema, then apply `schema.sql` statement by
/// statement. Assumes statements are `;`-terminated and do not nest semicolons.
async fn reset_schema(pool: &PgPool) -> Result<()> {
    sqlx::query("DROP SCHEMA public CASCADE")
        .execute(pool)
        .await
        .context("failed to drop schema")?;
    sqlx::query("CREATE SCHEMA public")
        .execute(pool)
        .await
        .context("failed to recreate schema")?;

    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") && current.trim().is_empty() {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

/// The production router with test extensions layered on.
fn app(pool: PgPool) -> Router {
    let config = AuthConfig::new(
        SecretString::from("integration-test-secret-0123456789abcdef"),
        "http://localhost:3000".to_string(),
    );
    let state = Arc::new(AuthState::new(config));
    crate::api::router()
        .layer(Extension(state))
        .layer(Extension(pool))
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    Ok((status, value))
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Register an owner and return (token, principal id, organization id).
async fn register_owner(
    app: &Router,
    name: &str,
    email: &str,
    organization: &str,
) -> Result<(String, String, String)> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register-owner",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "password": "passw0rd",
            "organizationName": organization,
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    Ok((
        field(&body, "token").to_string(),
        field(&body, "principalId").to_string(),
        field(&body, "organizationId").to_string(),
    ))
}

/// Provision a member and complete setup, returning (member token, principal id).
async fn provision_and_setup(
    app: &Router,
    owner_token: &str,
    name: &str,
    email: &str,
    password: &str,
) -> Result<(String, String)> {
    let (status, body) = send(
        app,
        "POST",
        "/organizations/my/members/provision",
        Some(owner_token),
        Some(json!({"email": email, "name": name, "role": "member"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "provision failed: {body}");
    let setup_token = field(&body, "setupToken").to_string();
    let principal_id = field(&body, "principalId").to_string();
    assert_eq!(setup_token.len(), 64);

    let (status, body) = send(
        app,
        "POST",
        &format!("/auth/complete-setup/{setup_token}"),
        None,
        Some(json!({"password": password})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "setup failed: {body}");
    Ok((field(&body, "token").to_string(), principal_id))
}

#[tokio::test]
async fn owner_registration_is_atomic_and_unique() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    let (token, principal_id, organization_id) =
        register_owner(&app, "Ada", "a@x.io", "Acme").await?;
    assert!(!token.is_empty());
    assert!(!principal_id.is_empty());
    assert!(!organization_id.is_empty());

    // Same email again: 400, and the store still holds exactly one principal.
    let (status, _) = send(
        &app,
        "POST",
        "/auth/register-owner",
        None,
        Some(json!({
            "name": "Ada Again",
            "email": "A@X.IO",
            "password": "passw0rd",
            "organizationName": "Other",
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM principals")
        .fetch_one(&db.pool)
        .await?;
    assert_eq!(count, 1);
    let orgs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations")
        .fetch_one(&db.pool)
        .await?;
    assert_eq!(orgs, 1);

    // Self-inspection carries the organization context and the owner role.
    let (status, body) = send(&app, "GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "organizationId"), organization_id);
    assert_eq!(field(&body, "role"), "owner");
    assert_eq!(
        body.get("memberships").and_then(Value::as_array).map(Vec::len),
        Some(1)
    );

    Ok(())
}

#[tokio::test]
async fn password_rules_apply_at_the_boundary() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    // Length 7 rejected, length 8 accepted.
    let (status, _) = send(
        &app,
        "POST",
        "/auth/register-owner",
        None,
        Some(json!({
            "name": "Ada", "email": "short@x.io",
            "password": "1234567", "organizationName": "Acme",
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/auth/register-owner",
        None,
        Some(json!({
            "name": "Ada", "email": "short@x.io",
            "password": "12345678", "organizationName": "Acme",
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn provisioning_and_setup_token_lifecycle() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    let (owner_token, _, organization_id) =
        register_owner(&app, "Ada", "a@x.io", "Acme").await?;

    let (status, body) = send(
        &app,
        "POST",
        "/organizations/my/members/provision",
        Some(&owner_token),
        Some(json!({"email": "b@x.io", "name": "Ben", "role": "member"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "provision failed: {body}");
    let setup_token = field(&body, "setupToken").to_string();

    // The pending principal cannot log in and cannot be provisioned twice.
    let (status, _) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": "b@x.io", "password": "whatever1"})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        "/organizations/my/members/provision",
        Some(&owner_token),
        Some(json!({"email": "b@x.io", "name": "Ben", "role": "member"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Short password rejected; the token survives for a valid retry.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/auth/complete-setup/{setup_token}"),
        None,
        Some(json!({"password": "short12"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/auth/complete-setup/{setup_token}"),
        None,
        Some(json!({"password": "hunter22x"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "setup failed: {body}");
    assert_eq!(field(&body, "organizationId"), organization_id);
    assert_eq!(field(&body, "role"), "member");
    let member_token = field(&body, "token").to_string();

    // Single use: a second consumption fails.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/auth/complete-setup/{setup_token}"),
        None,
        Some(json!({"password": "hunter22x"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Members read but do not administer the organization.
    let (status, _) = send(
        &app,
        "GET",
        "/organizations/my",
        Some(&member_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "PUT",
        "/organizations/my",
        Some(&member_token),
        Some(json!({"name": "Hijacked"})),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Provisioning an email that belongs to an active principal is refused.
    let (status, _) = send(
        &app,
        "POST",
        "/organizations/my/members/provision",
        Some(&owner_token),
        Some(json!({"email": "a@x.io", "name": "Ada", "role": "member"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn sole_owner_invariant_is_enforced() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    let (owner_token, owner_id, _) = register_owner(&app, "Ada", "a@x.io", "Acme").await?;

    // The sole active owner cannot demote herself; the store is unchanged.
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/organizations/my/members/{owner_id}/role"),
        Some(&owner_token),
        Some(json!({"newRole": "member"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let role: String =
        sqlx::query_scalar("SELECT role::text FROM memberships WHERE principal_id = $1")
            .bind(owner_id.parse::<uuid::Uuid>()?)
            .fetch_one(&db.pool)
            .await?;
    assert_eq!(role, "owner");

    // Nor can she remove herself.
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/my/members/{owner_id}"),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // With a second owner, the demotion goes through.
    let (member_token, member_id) =
        provision_and_setup(&app, &owner_token, "Ben", "b@x.io", "hunter22x").await?;
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/organizations/my/members/{member_id}/role"),
        Some(&owner_token),
        Some(json!({"newRole": "owner"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/organizations/my/members/{owner_id}/role"),
        Some(&owner_token),
        Some(json!({"newRole": "member"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // Roles are re-resolved per request: the demoted principal's old token
    // no longer authorizes owner operations.
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/my/members/{member_id}"),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // And the new sole owner cannot be removed, even by herself.
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/my/members/{member_id}"),
        Some(&member_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Removing the plain member is fine.
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/my/members/{owner_id}"),
        Some(&member_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn login_reconciles_the_active_organization() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    let (owner_token, _, organization_id) =
        register_owner(&app, "Ada", "a@x.io", "Acme").await?;

    // Wrong password and unknown email are indistinguishable.
    let (status, _) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": "a@x.io", "password": "wrong-password"})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": "ghost@x.io", "password": "wrong-password"})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": "a@x.io", "password": "passw0rd"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "organizationId"), organization_id);
    assert_eq!(field(&body, "role"), "owner");

    let last_login: Option<String> = sqlx::query_scalar(
        "SELECT to_char(last_login_at, 'YYYY') FROM principals WHERE lower(email) = 'a@x.io'",
    )
    .fetch_one(&db.pool)
    .await?;
    assert!(last_login.is_some());

    // A member removed from her only organization still logs in, but with no
    // active organization in the fresh token.
    let (_, member_id) =
        provision_and_setup(&app, &owner_token, "Ben", "b@x.io", "hunter22x").await?;
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/my/members/{member_id}"),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": "b@x.io", "password": "hunter22x"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("organizationId").is_none());
    assert!(body.get("role").is_none());

    Ok(())
}

#[tokio::test]
async fn organization_updates_validate_currency_and_timezone() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    let (owner_token, _, _) = register_owner(&app, "Ada", "a@x.io", "Acme").await?;

    let (status, _) = send(
        &app,
        "PUT",
        "/organizations/my",
        Some(&owner_token),
        Some(json!({"currency": "JPY"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PUT",
        "/organizations/my",
        Some(&owner_token),
        Some(json!({"timezone": "Not/AZone"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PUT",
        "/organizations/my",
        Some(&owner_token),
        Some(json!({
            "name": "Acme GmbH",
            "currency": "EUR",
            "timezone": "Europe/Berlin",
            "industry": "fintech",
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "update failed: {body}");
    assert_eq!(field(&body, "name"), "Acme GmbH");
    assert_eq!(field(&body, "currency"), "EUR");
    assert_eq!(field(&body, "timezone"), "Europe/Berlin");

    Ok(())
}

#[tokio::test]
async fn tenant_isolation_holds_across_organizations() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    let (token_a, principal_a, org_a) = register_owner(&app, "Ada", "a@x.io", "Acme").await?;
    let (token_c, _, org_c) = register_owner(&app, "Cleo", "c@x.io", "Cyberdyne").await?;
    assert_ne!(org_a, org_c);

    // Ada records an expense; the organization id comes from her context.
    let (status, body) = send(
        &app,
        "POST",
        "/expenses",
        Some(&token_a),
        Some(json!({
            "description": "AWS bill",
            "amountCents": 42_000,
            "category": "infrastructure",
            "paidBy": principal_a,
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "expense failed: {body}");
    let expense_id = field(&body, "id").to_string();

    // Cleo sees an empty collection and cannot address Ada's record by id.
    let (status, body) = send(&app, "GET", "/expenses", Some(&token_c), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(0));

    let (status, _) = send(
        &app,
        "GET",
        &format!("/expenses/{expense_id}"),
        Some(&token_c),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A cross-organization payer reference is refused at write time.
    let (status, _) = send(
        &app,
        "POST",
        "/expenses",
        Some(&token_c),
        Some(json!({
            "description": "Contractor",
            "amountCents": 10_000,
            "paidBy": principal_a,
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Switching into a foreign organization is a 404, not a 403.
    let (status, _) = send(
        &app,
        "POST",
        "/auth/set-active-organization",
        Some(&token_a),
        Some(json!({"organizationId": org_c})),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Switching into the current organization mints a fresh scoped token.
    let (status, body) = send(
        &app,
        "POST",
        "/auth/set-active-organization",
        Some(&token_a),
        Some(json!({"organizationId": org_a})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "organizationId"), org_a);

    Ok(())
}

#[tokio::test]
async fn bearer_token_is_required_and_checked() -> Result<()> {
    let db = match TestDb::new().await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }
    };
    let app = app(db.pool.clone());

    let (status, _) = send(&app, "GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/auth/me", Some("not-a-token"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/organizations/my", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[test]
fn sql_splitter_handles_comments_and_statements() {
    let statements = split_sql_statements(SCHEMA_SQL);
    assert!(statements.len() > 5);
    assert!(statements.iter().all(|s| s.ends_with(';')));
    assert!(statements
        .iter()
        .any(|s| s.contains("CREATE TABLE principals")));
}
