//! Membership management handlers for the active organization.
//!
//! Provisioning returns the raw setup token to the acting owner, who is
//! responsible for delivering it out of band; the server keeps only a digest.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::super::auth::{
    build_setup_url, generate_capability_token, hash_capability_token, normalize_email,
    principal::authenticate, valid_email, AuthState,
};
use super::storage::{
    change_member_role as store_change_member_role, fetch_members,
    provision_member as store_provision_member, remove_member as store_remove_member,
    ProvisionOutcome, RemoveOutcome, RoleChangeOutcome,
};
use super::types::{
    ChangeRoleRequest, MemberResponse, OrgRole, ProvisionMemberRequest, ProvisionMemberResponse,
};
use crate::api::handlers::ApiError;

#[utoipa::path(
    get,
    path = "/organizations/my/members",
    responses(
        (status = 200, description = "Memberships of the active organization.", body = [MemberResponse]),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "No active organization in the session."),
    ),
    tag = "members"
)]
pub async fn list_members(
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

    match fetch_members(&pool, org.organization_id).await {
        Ok(members) => (StatusCode::OK, Json(members)).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/organizations/my/members/provision",
    request_body = ProvisionMemberRequest,
    responses(
        (status = 201, description = "Member provisioned; setup token returned.", body = ProvisionMemberResponse),
        (status = 400, description = "Invalid input or the email is already in use.", body = String),
        (status = 401, description = "Missing or invalid bearer token."),
        (status = 403, description = "Caller is not an owner of the active organization."),
    ),
    tag = "members"
)]
pub async fn provision_member(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ProvisionMemberRequest>>,
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

    let name = request.name.trim();
    if name.is_empty() {
        return ApiError::Validation("Name is required.").into_response();
    }
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError::Validation("Invalid email address.").into_response();
    }
    let role = match request.role.as_deref() {
        None => OrgRole::Member,
        Some(value) => match OrgRole::parse(value) {
            Some(role) => role,
            None => return ApiError::Validation("Unknown role.").into_response(),
        },
    };

    let setup_token = match generate_capability_token() {
        Ok(token) => token,
        Err(err) => return ApiError::Internal(err).into_response(),
    };
    let token_hash = hash_capability_token(&setup_token);
    let ttl_seconds = auth_state.config().setup_token_ttl_seconds();

    let outcome = match store_provision_member(
        &pool,
        org.organization_id,
        context.principal.id,
        name,
        &email,
        role,
        &token_hash,
        ttl_seconds,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    match outcome {
        ProvisionOutcome::UserExists => ApiError::UserExists.into_response(),
        ProvisionOutcome::Provisioned {
            principal_id,
            expires_at,
        } => {
            let response = ProvisionMemberResponse {
                principal_id: principal_id.to_string(),
                setup_url: build_setup_url(auth_state.config().frontend_base_url(), &setup_token),
                setup_token,
                expires_at,
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/organizations/my/members/{principal_id}/role",
    request_body = ChangeRoleRequest,
    params(("principal_id" = String, Path, description = "Member's principal id")),
    responses(
        (status = 200, description = "Role changed."),
        (status = 400, description = "Unknown role or the change would strand the organization.", body = String),
        (status = 403, description = "Caller is not an owner of the active organization."),
        (status = 404, description = "No such membership in the active organization."),
    ),
    tag = "members"
)]
pub async fn change_member_role(
    Path(principal_id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangeRoleRequest>>,
) -> impl IntoResponse {
    let context = match authenticate(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    let org = match context.require_role(OrgRole::Owner) {
        Ok(org) => org,
        Err(err) => return err.into_response(),
    };

    let Ok(target) = principal_id.parse::<Uuid>() else {
        return ApiError::NotFound.into_response();
    };
    let Some(Json(request)) = payload else {
        return ApiError::Validation("Missing payload.").into_response();
    };
    let Some(new_role) = OrgRole::parse(&request.new_role) else {
        return ApiError::Validation("Unknown role.").into_response();
    };

    match store_change_member_role(&pool, org.organization_id, target, new_role).await {
        Ok(RoleChangeOutcome::Updated) => StatusCode::OK.into_response(),
        Ok(RoleChangeOutcome::SoleOwnerViolation) => ApiError::SoleOwnerViolation.into_response(),
        Ok(RoleChangeOutcome::NotFound) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/organizations/my/members/{principal_id}",
    params(("principal_id" = String, Path, description = "Member's principal id")),
    responses(
        (status = 200, description = "Membership removed."),
        (status = 400, description = "Removal would strand the organization.", body = String),
        (status = 403, description = "Caller is not an owner of the active organization."),
        (status = 404, description = "No such membership in the active organization."),
    ),
    tag = "members"
)]
pub async fn remove_member(
    Path(principal_id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let context = match authenticate(&headers, &pool, &auth_state).await {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };
    let org = match context.require_role(OrgRole::Owner) {
        Ok(org) => org,
        Err(err) => return err.into_response(),
    };

    let Ok(target) = principal_id.parse::<Uuid>() else {
        return ApiError::NotFound.into_response();
    };

    match store_remove_member(&pool, org.organization_id, target).await {
        Ok(RemoveOutcome::Removed) => StatusCode::OK.into_response(),
        Ok(RemoveOutcome::SoleOwnerViolation) => ApiError::SoleOwnerViolation.into_response(),
        Ok(RemoveOutcome::NotFound) => ApiError::NotFound.into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}
