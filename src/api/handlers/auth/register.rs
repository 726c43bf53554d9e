//! Owner self-registration.
//!
//! Creates the principal, its organization, and the owner membership in one
//! transaction, then mints the first session token scoped to that
//! organization.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::super::orgs::types::OrgRole;
use super::password::{hash_password_blocking, MIN_PASSWORD_LENGTH};
use super::storage::{register_owner as store_register_owner, RegisterOutcome};
use super::token;
use super::types::{AuthResponse, RegisterOwnerRequest};
use super::utils::{normalize_email, valid_email};
use super::AuthState;
use crate::api::handlers::ApiError;

#[utoipa::path(
    post,
    path = "/auth/register-owner",
    request_body = RegisterOwnerRequest,
    responses(
        (status = 201, description = "Owner registered; organization created.", body = AuthResponse),
        (status = 400, description = "Invalid input or email already in use.", body = String),
    ),
    tag = "auth"
)]
pub async fn register_owner(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterOwnerRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let name = request.name.trim();
    if name.is_empty() {
        return ApiError::Validation("Name is required.").into_response();
    }
    let organization_name = request.organization_name.trim();
    if organization_name.is_empty() {
        return ApiError::Validation("Organization name is required.").into_response();
    }
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError::Validation("Invalid email address.").into_response();
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return ApiError::Validation("Password must be at least 8 characters.").into_response();
    }

    let password_hash = match hash_password_blocking(request.password).await {
        Ok(hash) => hash,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let outcome =
        match store_register_owner(&pool, name, &email, &password_hash, organization_name).await {
            Ok(outcome) => outcome,
            Err(err) => return ApiError::Internal(err).into_response(),
        };

    match outcome {
        RegisterOutcome::DuplicateEmail => ApiError::DuplicateEmail.into_response(),
        RegisterOutcome::Created {
            principal_id,
            organization_id,
        } => {
            let token = match token::mint(
                auth_state.config().signing_secret(),
                principal_id,
                Some(organization_id),
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
                organization_id: Some(organization_id.to_string()),
                role: Some(OrgRole::Owner),
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
    }
}
