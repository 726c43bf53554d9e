//! Active-organization switch.
//!
//! Switching re-points the principal's persisted active-organization
//! reference and mints a fresh token scoped to the new organization. The
//! prior token stays valid until natural expiry; clients must discard it.

use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::super::orgs::types::OrgRole;
use super::principal::authenticate;
use super::storage::{persist_active_organization, resolve_org_context};
use super::token;
use super::types::{AuthResponse, SetActiveOrganizationRequest};
use super::AuthState;
use crate::api::handlers::ApiError;

#[utoipa::path(
    post,
    path = "/auth/set-active-organization",
    request_body = SetActiveOrganizationRequest,
    responses(
        (status = 200, description = "Active organization switched.", body = AuthResponse),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 404, description = "No active membership in the requested organization."),
    ),
    tag = "auth"
)]
pub async fn set_active_organization(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SetActiveOrganizationRequest>>,
) -> impl IntoResponse {
    let context = match authenticate(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };

    let Ok(organization_id) = request.organization_id.parse::<Uuid>() else {
        return ApiError::Validation("Invalid organization id.").into_response();
    };

    // Membership check before the switch; a miss is a 404 so organization
    // existence is not leaked across tenants.
    let role = match resolve_org_context(&pool, context.principal.id, organization_id).await {
        Ok(Some((_, role))) => role,
        Ok(None) => return ApiError::NotFound.into_response(),
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    if let Err(err) =
        persist_active_organization(&pool, context.principal.id, organization_id).await
    {
        return ApiError::Internal(err).into_response();
    }

    let token = match token::mint(
        auth_state.config().signing_secret(),
        context.principal.id,
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
        principal_id: context.principal.id.to_string(),
        organization_id: Some(organization_id.to_string()),
        role: OrgRole::parse(&role),
    };
    (StatusCode::OK, Json(response)).into_response()
}
