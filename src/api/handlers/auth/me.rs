//! Authenticated self-inspection.
//!
//! `/auth/me` stays reachable for principals that have not finished setup, so
//! clients can tell a half-provisioned account apart from a broken token.

use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;

use super::super::orgs::types::OrgRole;
use super::principal::authenticate_allow_inactive;
use super::storage::fetch_active_memberships;
use super::types::{MeResponse, MembershipSummary, PrincipalResponse};
use super::AuthState;

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The authenticated principal and its memberships.", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token."),
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let context = match authenticate_allow_inactive(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };

    let memberships = match fetch_active_memberships(&pool, context.principal.id).await {
        Ok(memberships) => memberships,
        Err(err) => return crate::api::handlers::ApiError::Internal(err).into_response(),
    };

    let principal = &context.principal;
    let response = MeResponse {
        principal: PrincipalResponse {
            id: principal.id.to_string(),
            email: principal.email.clone(),
            display_name: principal.display_name.clone(),
            is_active: principal.is_active,
            is_platform_admin: principal.is_platform_admin,
            active_organization_id: principal.active_organization_id.map(|id| id.to_string()),
            default_organization_id: principal.default_organization_id.map(|id| id.to_string()),
            preferences: principal.preferences.clone(),
            last_login_at: principal.last_login_at.clone(),
            created_at: principal.created_at.clone(),
        },
        organization_id: context.org.as_ref().map(|org| org.organization_id.to_string()),
        role: context.org.as_ref().map(|org| org.role),
        memberships: memberships
            .into_iter()
            .filter_map(|m| {
                OrgRole::parse(&m.role).map(|role| MembershipSummary {
                    organization_id: m.organization_id.to_string(),
                    organization_name: m.organization_name,
                    role,
                })
            })
            .collect(),
    };

    (StatusCode::OK, Json(response)).into_response()
}
