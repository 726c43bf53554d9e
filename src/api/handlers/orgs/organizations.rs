//! Active-organization CRUD handlers.
//!
//! Every handler works on the organization carried by the request context;
//! there is no way to address another tenant's organization from here.

use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;

use super::super::auth::{principal::authenticate, AuthState};
use super::storage::{fetch_organization, update_organization};
use super::types::{Currency, OrgRole, OrganizationResponse, UpdateOrganizationRequest};
use crate::api::handlers::ApiError;

#[utoipa::path(
    get,
    path = "/organizations/my",
    responses(
        (status = 200, description = "The active organization.", body = OrganizationResponse),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "No active organization in the session."),
    ),
    tag = "organizations"
)]
pub async fn get_my_organization(
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

    match fetch_organization(&pool, org.organization_id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row.to_response())).into_response(),
        Ok(None) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/organizations/my",
    request_body = UpdateOrganizationRequest,
    responses(
        (status = 200, description = "Organization updated.", body = OrganizationResponse),
        (status = 400, description = "Invalid currency, timezone, or payload.", body = String),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "Caller is not an owner of the active organization."),
    ),
    tag = "organizations"
)]
pub async fn update_my_organization(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateOrganizationRequest>>,
) -> impl IntoResponse {
    let context = match authenticate(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    let org = match context.require_role(OrgRole::Owner) {
        Ok(org) => org,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if request.name.is_some() && name.is_none() {
        return ApiError::Validation("Organization name must not be empty.").into_response();
    }

    let currency = match request.currency.as_deref() {
        Some(code) => match Currency::parse(code) {
            Some(currency) => Some(currency),
            None => return ApiError::Validation("Unsupported currency code.").into_response(),
        },
        None => None,
    };

    if let Some(timezone) = request.timezone.as_deref() {
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            return ApiError::Validation("Unknown IANA timezone.").into_response();
        }
    }

    if name.is_none()
        && request.industry.is_none()
        && request.timezone.is_none()
        && currency.is_none()
        && request.settings.is_none()
    {
        return ApiError::Validation("No updates provided.").into_response();
    }

    match update_organization(
        &pool,
        org.organization_id,
        name,
        request.industry.as_deref(),
        request.timezone.as_deref(),
        currency,
        request.settings.as_ref(),
    )
    .await
    {
        Ok(Some(row)) => (StatusCode::OK, Json(row.to_response())).into_response(),
        Ok(None) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}
