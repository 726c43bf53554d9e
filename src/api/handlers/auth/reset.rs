//! Password-reset flow.
//!
//! Requesting a reset always answers `204` so the endpoint cannot be used to
//! probe for accounts; the reset link itself is delivered out of band. The
//! reset token is the same single-use capability as the setup token, with a
//! one-hour lifetime.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::super::orgs::types::OrgRole;
use super::password::{hash_password_blocking, MIN_PASSWORD_LENGTH};
use super::storage::{consume_reset_token, create_reset_token, ResetOutcome};
use super::token;
use super::types::{AuthResponse, RequestPasswordResetRequest, ResetPasswordRequest};
use super::utils::{
    build_reset_url, generate_capability_token, hash_capability_token, normalize_email,
    valid_email,
};
use super::AuthState;
use crate::api::handlers::ApiError;

#[utoipa::path(
    post,
    path = "/auth/request-password-reset",
    request_body = RequestPasswordResetRequest,
    responses(
        (status = 204, description = "Reset link issued if the account exists."),
        (status = 400, description = "Invalid email.", body = String),
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RequestPasswordResetRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError::Validation("Invalid email address.").into_response();
    }

    let reset_token = match generate_capability_token() {
        Ok(token) => token,
        Err(err) => return ApiError::Internal(err).into_response(),
    };
    let token_hash = hash_capability_token(&reset_token);

    match create_reset_token(
        &pool,
        &email,
        &token_hash,
        auth_state.config().reset_token_ttl_seconds(),
    )
    .await
    {
        Ok(true) => {
            // Delivery is out of band; the link is only traced for operators
            // running without a mail pipeline.
            debug!(
                reset_url = %build_reset_url(auth_state.config().frontend_base_url(), &reset_token),
                "password reset link generated"
            );
        }
        Ok(false) => {}
        Err(err) => return ApiError::Internal(err).into_response(),
    }

    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    post,
    path = "/auth/reset-password/{token}",
    request_body = ResetPasswordRequest,
    params(("token" = String, Path, description = "Reset token from the reset link")),
    responses(
        (status = 200, description = "Password reset.", body = AuthResponse),
        (status = 400, description = "Invalid or expired token, or invalid password.", body = String),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Path(reset_token): Path<String>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let reset_token = reset_token.trim();
    if reset_token.is_empty() {
        return ApiError::InvalidCapability.into_response();
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return ApiError::Validation("Password must be at least 8 characters.").into_response();
    }

    let password_hash = match hash_password_blocking(request.password).await {
        Ok(hash) => hash,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let token_hash = hash_capability_token(reset_token);
    let outcome = match consume_reset_token(&pool, &token_hash, &password_hash).await {
        Ok(outcome) => outcome,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    match outcome {
        ResetOutcome::Invalid => ApiError::InvalidCapability.into_response(),
        ResetOutcome::Reset {
            principal_id,
            organization_id,
            role,
        } => {
            let token = match token::mint(
                auth_state.config().signing_secret(),
                principal_id,
                organization_id,
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
                organization_id: organization_id.map(|org| org.to_string()),
                role: role.as_deref().and_then(OrgRole::parse),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
    }
}
