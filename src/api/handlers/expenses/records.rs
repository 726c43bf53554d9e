//! Expense handlers for the active organization.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use regex::Regex;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::super::auth::{principal::authenticate, AuthState};
use super::super::orgs::types::OrgRole;
use super::storage::{fetch_expense, fetch_expenses, insert_expense};
use super::types::{CreateExpenseRequest, ExpenseResponse};
use crate::api::handlers::ApiError;
use crate::api::scope::assert_active_member;

const DEFAULT_CATEGORY: &str = "uncategorized";

fn valid_date(value: &str) -> bool {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").is_ok_and(|regex| regex.is_match(value))
}

#[utoipa::path(
    get,
    path = "/expenses",
    responses(
        (status = 200, description = "Expenses of the active organization.", body = [ExpenseResponse]),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "No active organization in the session."),
    ),
    tag = "expenses"
)]
pub async fn list_expenses(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let context = match authenticate(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    let org = match context.require_role(OrgRole::Member) {
        Ok(org) => org,
        Err(err) => return err.into_response(),
    };

    match fetch_expenses(&pool, org.scope()).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/expenses",
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense recorded.", body = ExpenseResponse),
        (status = 400, description = "Invalid input.", body = String),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "No active organization in the session."),
    ),
    tag = "expenses"
)]
pub async fn create_expense(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateExpenseRequest>>,
) -> impl IntoResponse {
    let context = match authenticate(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    let org = match context.require_role(OrgRole::Member) {
        Ok(org) => org,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let description = request.description.trim();
    if description.is_empty() {
        return ApiError::Validation("Description is required.").into_response();
    }
    if request.amount_cents <= 0 {
        return ApiError::Validation("Amount must be positive.").into_response();
    }
    if let Some(date) = request.incurred_on.as_deref() {
        if !valid_date(date) {
            return ApiError::Validation("Date must be YYYY-MM-DD.").into_response();
        }
    }

    let scope = org.scope();

    // Cross-reference check: the payer must belong to this organization.
    let paid_by = match request.paid_by.as_deref() {
        None => None,
        Some(raw) => {
            let Ok(principal_id) = raw.parse::<Uuid>() else {
                return ApiError::Validation("Invalid payer id.").into_response();
            };
            match assert_active_member(&pool, scope, principal_id).await {
                Ok(true) => Some(principal_id),
                Ok(false) => {
                    return ApiError::Validation(
                        "Payer must be an active member of the organization.",
                    )
                    .into_response()
                }
                Err(err) => return ApiError::Internal(err).into_response(),
            }
        }
    };

    let category = request
        .category
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CATEGORY);

    match insert_expense(
        &pool,
        scope,
        context.principal.id,
        description,
        request.amount_cents,
        category,
        request.incurred_on.as_deref(),
        paid_by,
    )
    .await
    {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/expenses/{id}",
    params(("id" = String, Path, description = "Expense id")),
    responses(
        (status = 200, description = "Expense detail.", body = ExpenseResponse),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "No active organization in the session."),
        (status = 404, description = "No such expense in the active organization."),
    ),
    tag = "expenses"
)]
pub async fn get_expense(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let context = match authenticate(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    let org = match context.require_role(OrgRole::Member) {
        Ok(org) => org,
        Err(err) => return err.into_response(),
    };

    let Ok(id) = id.parse::<Uuid>() else {
        return ApiError::NotFound.into_response();
    };

    match fetch_expense(&pool, org.scope(), id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row)).into_response(),
        Ok(None) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::valid_date;

    #[test]
    fn valid_date_accepts_iso_shape() {
        assert!(valid_date("2026-08-07"));
        assert!(!valid_date("08/07/2026"));
        assert!(!valid_date("2026-8-7"));
        assert!(!valid_date(""));
    }
}
