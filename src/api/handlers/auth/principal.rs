//! Request context resolution and authorization gates.
//!
//! Flow Overview: read the bearer token, verify it, materialize the principal
//! from the store, and resolve the token's active organization into a
//! (organization, role, membership) triple. Handlers then narrow the context
//! through [`RequestContext::require_active_organization`] and
//! [`RequestContext::require_role`].

use axum::http::{header::AUTHORIZATION, HeaderMap};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::super::error::ApiError;
use super::super::orgs::types::OrgRole;
use super::storage::{fetch_principal, resolve_org_context, PrincipalRow};
use super::token::{self, TokenError};
use super::AuthState;
use crate::api::scope::OrgScope;

/// Resolved active-organization context for a request.
#[derive(Debug, Clone)]
pub(crate) struct OrgContext {
    pub(crate) organization_id: Uuid,
    pub(crate) membership_id: Uuid,
    pub(crate) role: OrgRole,
}

impl OrgContext {
    /// Tenant scope for domain storage; the only way to construct one.
    pub(crate) fn scope(&self) -> OrgScope {
        OrgScope::from_context(self.organization_id)
    }
}

/// Per-request context: the authenticated principal and, when the session
/// token carries one that maps to an active membership, its organization.
#[derive(Debug, Clone)]
pub(crate) struct RequestContext {
    pub(crate) principal: PrincipalRow,
    pub(crate) org: Option<OrgContext>,
}

impl RequestContext {
    /// Narrow to a context that carries an active organization.
    pub(crate) fn require_active_organization(&self) -> Result<&OrgContext, ApiError> {
        self.org.as_ref().ok_or(ApiError::OrgContextRequired)
    }

    /// Narrow to a context whose role is at least `required`.
    pub(crate) fn require_role(&self, required: OrgRole) -> Result<&OrgContext, ApiError> {
        let org = self.require_active_organization()?;
        if org.role.allows(required) {
            Ok(org)
        } else {
            Err(ApiError::InsufficientRole)
        }
    }
}

/// Resolve the bearer token into a request context, refusing principals that
/// have not completed setup.
pub(crate) async fn authenticate(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<RequestContext, ApiError> {
    let context = resolve_context(headers, pool, state).await?;
    if !context.principal.is_active {
        return Err(ApiError::SetupIncomplete);
    }
    Ok(context)
}

/// Resolve the bearer token for self-inspection endpoints, which stay
/// reachable while account setup is incomplete.
pub(crate) async fn authenticate_allow_inactive(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<RequestContext, ApiError> {
    resolve_context(headers, pool, state).await
}

async fn resolve_context(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<RequestContext, ApiError> {
    let Some(bearer) = extract_bearer_token(headers) else {
        return Err(ApiError::Unauthenticated);
    };

    let claims =
        token::verify(state.config().signing_secret(), &bearer).map_err(|err| match err {
            TokenError::Expired => ApiError::ExpiredToken,
            _ => ApiError::InvalidToken,
        })?;

    let principal_id = claims.principal_id().map_err(|_| ApiError::InvalidToken)?;
    let principal = fetch_principal(pool, principal_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::Unauthenticated)?;

    let org = match claims.organization_id().map_err(|_| ApiError::InvalidToken)? {
        Some(organization_id) => {
            match resolve_org_context(pool, principal_id, organization_id).await {
                Ok(Some((membership_id, role))) => OrgRole::parse(&role).map(|role| OrgContext {
                    organization_id,
                    membership_id,
                    role,
                }),
                Ok(None) => {
                    // The membership may have been removed or suspended after
                    // the token was minted; endpoints that need org context
                    // reject later, the rest keep working.
                    warn!(
                        principal = %principal_id,
                        organization = %organization_id,
                        "session token carries org without an active membership"
                    );
                    None
                }
                Err(err) => {
                    return Err(ApiError::Internal(err));
                }
            }
        }
        None => None,
    };

    Ok(RequestContext { principal, org })
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn principal_row(is_active: bool) -> PrincipalRow {
        PrincipalRow {
            id: Uuid::new_v4(),
            email: "a@x.io".to_string(),
            display_name: "Ada".to_string(),
            is_active,
            is_platform_admin: false,
            active_organization_id: None,
            default_organization_id: None,
            preferences: json!({}),
            last_login_at: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn context_with_role(role: Option<OrgRole>) -> RequestContext {
        RequestContext {
            principal: principal_row(true),
            org: role.map(|role| OrgContext {
                organization_id: Uuid::new_v4(),
                membership_id: Uuid::new_v4(),
                role,
            }),
        }
    }

    #[test]
    fn extract_bearer_token_parses_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn extract_bearer_token_accepts_lowercase_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn extract_bearer_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn require_active_organization_gates_missing_org() {
        let context = context_with_role(None);
        assert!(matches!(
            context.require_active_organization(),
            Err(ApiError::OrgContextRequired)
        ));
        let context = context_with_role(Some(OrgRole::Member));
        assert!(context.require_active_organization().is_ok());
    }

    #[test]
    fn require_role_applies_the_lattice() {
        let member = context_with_role(Some(OrgRole::Member));
        assert!(member.require_role(OrgRole::Member).is_ok());
        assert!(matches!(
            member.require_role(OrgRole::Owner),
            Err(ApiError::InsufficientRole)
        ));

        let owner = context_with_role(Some(OrgRole::Owner));
        assert!(owner.require_role(OrgRole::Member).is_ok());
        assert!(owner.require_role(OrgRole::Owner).is_ok());
    }

    #[test]
    fn require_role_without_org_reports_missing_context() {
        let context = context_with_role(None);
        assert!(matches!(
            context.require_role(OrgRole::Member),
            Err(ApiError::OrgContextRequired)
        ));
    }
}
