//! Setup-token consumption.
//!
//! A provisioned principal presents its single-use setup token and chooses a
//! password. Activation, membership promotion, and organization adoption
//! happen atomically; a second consumption of the same token fails.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::super::orgs::types::OrgRole;
use super::password::{hash_password_blocking, MIN_PASSWORD_LENGTH};
use super::storage::{consume_setup_token, SetupOutcome};
use super::token;
use super::types::{AuthResponse, CompleteSetupRequest};
use super::utils::hash_capability_token;
use super::AuthState;
use crate::api::handlers::ApiError;

#[utoipa::path(
    post,
    path = "/auth/complete-setup/{token}",
    request_body = CompleteSetupRequest,
    params(("token" = String, Path, description = "Setup token from the invitation link")),
    responses(
        (status = 200, description = "Account activated.", body = AuthResponse),
        (status = 400, description = "Invalid or expired token, or invalid password.", body = String),
    ),
    tag = "auth"
)]
pub async fn complete_setup(
    Path(setup_token): Path<String>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CompleteSetupRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let setup_token = setup_token.trim();
    if setup_token.is_empty() {
        return ApiError::InvalidCapability.into_response();
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return ApiError::Validation("Password must be at least 8 characters.").into_response();
    }

    let password_hash = match hash_password_blocking(request.password).await {
        Ok(hash) => hash,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    let token_hash = hash_capability_token(setup_token);
    let outcome = match consume_setup_token(&pool, &token_hash, &password_hash).await {
        Ok(outcome) => outcome,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    match outcome {
        SetupOutcome::Invalid => ApiError::InvalidCapability.into_response(),
        SetupOutcome::AlreadyActive => ApiError::AlreadyActive.into_response(),
        SetupOutcome::Activated {
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
