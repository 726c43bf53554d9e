//! Request/response types for auth endpoints.

use crate::api::handlers::orgs::types::OrgRole;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOwnerRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub organization_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteSetupRequest {
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveOrganizationRequest {
    pub organization_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Envelope returned by every authentication-changing flow.
///
/// Always carries a fresh session token; the organization fields reflect the
/// active organization encoded in that token, when one exists.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub principal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<OrgRole>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub is_platform_admin: bool,
    pub active_organization_id: Option<String>,
    pub default_organization_id: Option<String>,
    pub preferences: serde_json::Value,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MembershipSummary {
    pub organization_id: String,
    pub organization_name: String,
    pub role: OrgRole,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub principal: PrincipalResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<OrgRole>,
    pub memberships: Vec<MembershipSummary>,
}
