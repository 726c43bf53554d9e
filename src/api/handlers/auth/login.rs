//! Password login.
//!
//! Unknown emails and wrong passwords are indistinguishable in both the
//! response and, via a dummy verification, in timing. A correct password on a
//! not-yet-activated account yields an explicit `SetupIncomplete` signal and
//! no token.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::super::orgs::types::OrgRole;
use super::password::{dummy_verify_blocking, verify_password_blocking};
use super::storage::{
    choose_active_org, fetch_active_memberships, fetch_principal, lookup_credentials, record_login,
};
use super::token;
use super::types::{AuthResponse, LoginRequest};
use super::utils::normalize_email;
use super::AuthState;
use crate::api::handlers::ApiError;

const LOGIN_FAILED: &str = "Invalid email or password.";

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded.", body = AuthResponse),
        (status = 401, description = "Invalid email or password.", body = String),
        (status = 403, description = "Account setup is incomplete.", body = String),
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let email = normalize_email(&request.email);

    let credentials = match lookup_credentials(&pool, &email).await {
        Ok(credentials) => credentials,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    // Burn a hash verification on every miss so timing does not reveal
    // whether the email exists or has a password yet.
    let Some(credentials) = credentials else {
        dummy_verify_blocking(request.password).await;
        return (StatusCode::UNAUTHORIZED, LOGIN_FAILED).into_response();
    };
    let Some(password_hash) = credentials.password_hash else {
        dummy_verify_blocking(request.password).await;
        return (StatusCode::UNAUTHORIZED, LOGIN_FAILED).into_response();
    };

    match verify_password_blocking(request.password, password_hash).await {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, LOGIN_FAILED).into_response(),
        Err(err) => return ApiError::Internal(err).into_response(),
    }

    if !credentials.is_active {
        return ApiError::SetupIncomplete.into_response();
    }

    let principal_id = credentials.id;

    let principal = match fetch_principal(&pool, principal_id).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return ApiError::Unauthenticated.into_response(),
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let memberships = match fetch_active_memberships(&pool, principal_id).await {
        Ok(memberships) => memberships,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let chosen = choose_active_org(
        principal.active_organization_id,
        principal.default_organization_id,
        &memberships,
    );

    if let Err(err) = record_login(&pool, principal_id, chosen).await {
        return ApiError::Internal(err).into_response();
    }

    let role = chosen.and_then(|org| {
        memberships
            .iter()
            .find(|m| m.organization_id == org)
            .and_then(|m| OrgRole::parse(&m.role))
    });

    let token = match token::mint(
        auth_state.config().signing_secret(),
        principal_id,
        chosen,
        auth_state.config().token_ttl_seconds(),
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to mint session token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response = AuthResponse {
        token,
        principal_id: principal_id.to_string(),
        organization_id: chosen.map(|org| org.to_string()),
        role,
    };
    (StatusCode::OK, Json(response)).into_response()
}
