//! SQL helpers for the expenses collection.
//!
//! Every function takes an [`OrgScope`]: inserts bind the scope's
//! organization id, and reads AND it into the predicate so a record from
//! another tenant is indistinguishable from a missing one.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::ExpenseResponse;
use crate::api::scope::OrgScope;

const TIMESTAMP_FORMAT: &str = r#"YYYY-MM-DD"T"HH24:MI:SS"Z""#;

fn row_to_response(row: &sqlx::postgres::PgRow) -> ExpenseResponse {
    ExpenseResponse {
        id: row.get::<Uuid, _>("id").to_string(),
        description: row.get("description"),
        amount_cents: row.get("amount_cents"),
        category: row.get("category"),
        incurred_on: row.get("incurred_on"),
        paid_by: row.get::<Option<Uuid>, _>("paid_by").map(|id| id.to_string()),
        created_by: row.get::<Uuid, _>("created_by").to_string(),
        created_at: row.get("created_at"),
    }
}

/// Insert an expense under the scope's organization.
pub(super) async fn insert_expense(
    pool: &PgPool,
    scope: OrgScope,
    created_by: Uuid,
    description: &str,
    amount_cents: i64,
    category: &str,
    incurred_on: Option<&str>,
    paid_by: Option<Uuid>,
) -> Result<ExpenseResponse> {
    let query = format!(
        r"
        INSERT INTO expenses
            (organization_id, description, amount_cents, category, incurred_on, paid_by, created_by)
        VALUES ($1, $2, $3, $4, COALESCE($5::date, CURRENT_DATE), $6, $7)
        RETURNING id, description, amount_cents, category,
                  to_char(incurred_on, 'YYYY-MM-DD') AS incurred_on,
                  paid_by, created_by,
                  to_char(created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(scope.id())
        .bind(description)
        .bind(amount_cents)
        .bind(category)
        .bind(incurred_on)
        .bind(paid_by)
        .bind(created_by)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert expense")?;

    Ok(row_to_response(&row))
}

/// List the scope's expenses, newest first.
pub(super) async fn fetch_expenses(pool: &PgPool, scope: OrgScope) -> Result<Vec<ExpenseResponse>> {
    let query = format!(
        r"
        SELECT id, description, amount_cents, category,
               to_char(incurred_on, 'YYYY-MM-DD') AS incurred_on,
               paid_by, created_by,
               to_char(created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at
        FROM expenses
        WHERE organization_id = $1
        ORDER BY incurred_on DESC, created_at DESC
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(scope.id())
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch expenses")?;

    Ok(rows.iter().map(row_to_response).collect())
}

/// Fetch one expense by id within the scope; cross-tenant ids return `None`.
pub(super) async fn fetch_expense(
    pool: &PgPool,
    scope: OrgScope,
    id: Uuid,
) -> Result<Option<ExpenseResponse>> {
    let query = format!(
        r"
        SELECT id, description, amount_cents, category,
               to_char(incurred_on, 'YYYY-MM-DD') AS incurred_on,
               paid_by, created_by,
               to_char(created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at
        FROM expenses
        WHERE id = $1 AND organization_id = $2
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(scope.id())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch expense")?;

    Ok(row.as_ref().map(row_to_response))
}
