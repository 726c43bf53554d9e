//! Tenant scoping contract for domain collections.
//!
//! Every domain record carries an organization id, and every domain storage
//! function takes an [`OrgScope`] instead of a raw id. Scopes can only be
//! built from a resolved request context, so a handler cannot accidentally
//! write or read across the tenant boundary:
//!
//! - **Write**: inserts bind `scope.id()` as the organization id; callers
//!   cannot override it.
//! - **Read by id**: lookups match `id = $1 AND organization_id = $2`; a
//!   record in another organization is a plain not-found, never a forbidden.
//! - **Query**: list and aggregate queries carry `organization_id = $1` as
//!   their first predicate.
//! - **Cross-reference**: references to principals (assignees, payers) are
//!   validated against the membership registry at write time via
//!   [`assert_active_member`].

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Proof that a request is scoped to one organization.
///
/// Constructed only by the request context resolver; see
/// `auth::principal::OrgContext::scope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OrgScope {
    organization_id: Uuid,
}

impl OrgScope {
    pub(crate) fn from_context(organization_id: Uuid) -> Self {
        Self { organization_id }
    }

    /// The organization id this scope is bound to.
    pub(crate) fn id(&self) -> Uuid {
        self.organization_id
    }
}

/// `true` when the principal holds an active membership inside the scope.
///
/// Used to validate cross-references at write time. Best-effort: a
/// concurrently removed membership can still dangle, which is acceptable
/// alongside the soft foreign keys used elsewhere.
pub(crate) async fn assert_active_member(
    pool: &PgPool,
    scope: OrgScope,
    principal_id: Uuid,
) -> Result<bool> {
    let query = r"
        SELECT EXISTS(
            SELECT 1 FROM memberships
            WHERE organization_id = $1 AND principal_id = $2 AND status = 'active'
        ) AS is_member
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(scope.id())
        .bind(principal_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check membership for cross-reference")?;
    Ok(row.get("is_member"))
}

#[cfg(test)]
mod tests {
    use super::OrgScope;
    use uuid::Uuid;

    #[test]
    fn scope_carries_its_organization() {
        let org = Uuid::new_v4();
        let scope = OrgScope::from_context(org);
        assert_eq!(scope.id(), org);
    }

    #[test]
    fn scopes_compare_by_organization() {
        let org = Uuid::new_v4();
        assert_eq!(OrgScope::from_context(org), OrgScope::from_context(org));
        assert_ne!(
            OrgScope::from_context(org),
            OrgScope::from_context(Uuid::new_v4())
        );
    }
}
