//! Shared SQL storage helpers for the organization and membership registries.
//!
//! Membership mutations that could strand an organization without an active
//! owner (role changes, removals) serialize per organization with a
//! transaction-scoped advisory lock, so the sole-owner check always observes
//! the same snapshot it mutates.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::{Currency, MemberResponse, MembershipStatus, OrganizationResponse, OrgRole};
use crate::api::handlers::auth::{provision_principal, ProvisionPrincipalOutcome};

const TIMESTAMP_FORMAT: &str = r#"YYYY-MM-DD"T"HH24:MI:SS"Z""#;

#[derive(Debug)]
pub(super) struct OrganizationRow {
    id: Uuid,
    name: String,
    industry: Option<String>,
    timezone: String,
    currency: String,
    settings: Option<String>,
    created_at: String,
}

impl OrganizationRow {
    /// Convert the row into the public DTO; unknown currency values cannot
    /// occur because the column is a database enum.
    pub(super) fn to_response(&self) -> OrganizationResponse {
        OrganizationResponse {
            id: self.id.to_string(),
            name: self.name.clone(),
            industry: self.industry.clone(),
            timezone: self.timezone.clone(),
            currency: Currency::parse(&self.currency).unwrap_or(Currency::USD),
            settings: self
                .settings
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(serde_json::Value::Null),
            created_at: self.created_at.clone(),
        }
    }
}

#[derive(Debug)]
pub(super) enum ProvisionOutcome {
    Provisioned {
        principal_id: Uuid,
        expires_at: String,
    },
    UserExists,
}

#[derive(Debug)]
pub(super) enum RoleChangeOutcome {
    Updated,
    SoleOwnerViolation,
    NotFound,
}

#[derive(Debug)]
pub(super) enum RemoveOutcome {
    Removed,
    SoleOwnerViolation,
    NotFound,
}

/// Fetch an organization by id.
pub(super) async fn fetch_organization(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Option<OrganizationRow>> {
    let query = format!(
        r"
        SELECT id, name, industry, timezone, currency::text AS currency,
               settings::text AS settings,
               to_char(created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at
        FROM organizations
        WHERE id = $1
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(organization_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch organization")?;

    Ok(row.map(|row| OrganizationRow {
        id: row.get("id"),
        name: row.get("name"),
        industry: row.get("industry"),
        timezone: row.get("timezone"),
        currency: row.get("currency"),
        settings: row.get("settings"),
        created_at: row.get("created_at"),
    }))
}

/// Apply validated updates to an organization's mutable fields.
///
/// Validation (currency set membership, IANA timezone) happens in the handler;
/// this function only persists.
pub(super) async fn update_organization(
    pool: &PgPool,
    organization_id: Uuid,
    name: Option<&str>,
    industry: Option<&str>,
    timezone: Option<&str>,
    currency: Option<Currency>,
    settings: Option<&serde_json::Value>,
) -> Result<Option<OrganizationRow>> {
    let settings_text = settings.map(ToString::to_string);
    let query = format!(
        r"
        UPDATE organizations
        SET name = COALESCE($2, name),
            industry = COALESCE($3, industry),
            timezone = COALESCE($4, timezone),
            currency = COALESCE($5::currency_code, currency),
            settings = COALESCE($6::jsonb, settings)
        WHERE id = $1
        RETURNING id, name, industry, timezone, currency::text AS currency,
                  settings::text AS settings,
                  to_char(created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(organization_id)
        .bind(name)
        .bind(industry)
        .bind(timezone)
        .bind(currency.map(Currency::as_str))
        .bind(settings_text)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update organization")?;

    Ok(row.map(|row| OrganizationRow {
        id: row.get("id"),
        name: row.get("name"),
        industry: row.get("industry"),
        timezone: row.get("timezone"),
        currency: row.get("currency"),
        settings: row.get("settings"),
        created_at: row.get("created_at"),
    }))
}

/// List the memberships of an organization with their principals.
pub(super) async fn fetch_members(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Vec<MemberResponse>> {
    let query = format!(
        r"
        SELECT m.principal_id, p.email, p.display_name,
               m.role::text AS role, m.status::text AS status,
               m.invited_by,
               to_char(m.created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at
        FROM memberships m
        JOIN principals p ON p.id = m.principal_id
        WHERE m.organization_id = $1
        ORDER BY m.created_at ASC
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(organization_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch members")?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let role = OrgRole::parse(&row.get::<String, _>("role"))?;
            let status = MembershipStatus::parse(&row.get::<String, _>("status"))?;
            Some(MemberResponse {
                principal_id: row.get::<Uuid, _>("principal_id").to_string(),
                email: row.get("email"),
                display_name: row.get("display_name"),
                role,
                status,
                invited_by: row
                    .get::<Option<Uuid>, _>("invited_by")
                    .map(|id| id.to_string()),
                created_at: row.get("created_at"),
            })
        })
        .collect())
}

/// Provision a new member: provisional principal plus pending membership,
/// in one transaction. The caller owns setup-token generation and delivery.
pub(super) async fn provision_member(
    pool: &PgPool,
    organization_id: Uuid,
    inviter_id: Uuid,
    name: &str,
    email_normalized: &str,
    role: OrgRole,
    setup_token_hash: &[u8],
    setup_ttl_seconds: i64,
) -> Result<ProvisionOutcome> {
    let mut tx = pool.begin().await.context("begin provision transaction")?;

    let principal_id = match provision_principal(
        &mut tx,
        name,
        email_normalized,
        setup_token_hash,
        setup_ttl_seconds,
    )
    .await?
    {
        ProvisionPrincipalOutcome::Created(id) | ProvisionPrincipalOutcome::Reused(id) => id,
        ProvisionPrincipalOutcome::UserExists => {
            let _ = tx.rollback().await;
            return Ok(ProvisionOutcome::UserExists);
        }
    };

    let query = r"
        INSERT INTO memberships (principal_id, organization_id, role, status, invited_by)
        VALUES ($1, $2, $3::org_role, 'pending_user_setup', $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let insert = sqlx::query(query)
        .bind(principal_id)
        .bind(organization_id)
        .bind(role.as_str())
        .bind(inviter_id)
        .execute(&mut *tx)
        .instrument(span)
        .await;

    if let Err(err) = insert {
        if crate::api::handlers::auth::is_unique_violation(&err) {
            let _ = tx.rollback().await;
            return Ok(ProvisionOutcome::UserExists);
        }
        return Err(err).context("failed to insert pending membership");
    }

    let query = format!(
        r"
        SELECT to_char(setup_token_expires_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS expires_at
        FROM principals
        WHERE id = $1
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let expires_at: String = sqlx::query(&query)
        .bind(principal_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to read setup token expiry")?
        .get("expires_at");

    tx.commit().await.context("commit provision transaction")?;

    Ok(ProvisionOutcome::Provisioned {
        principal_id,
        expires_at,
    })
}

/// Change a member's role, refusing changes that would leave the organization
/// without an active owner.
pub(super) async fn change_member_role(
    pool: &PgPool,
    organization_id: Uuid,
    target_principal_id: Uuid,
    new_role: OrgRole,
) -> Result<RoleChangeOutcome> {
    let mut tx = pool.begin().await.context("begin role-change transaction")?;
    lock_organization(&mut tx, organization_id).await?;

    let Some((role, status)) = fetch_membership(&mut tx, organization_id, target_principal_id)
        .await?
    else {
        let _ = tx.rollback().await;
        return Ok(RoleChangeOutcome::NotFound);
    };

    let demoting_active_owner = role == OrgRole::Owner
        && status == MembershipStatus::Active
        && new_role != OrgRole::Owner;
    if demoting_active_owner
        && count_other_active_owners(&mut tx, organization_id, target_principal_id).await? == 0
    {
        let _ = tx.rollback().await;
        return Ok(RoleChangeOutcome::SoleOwnerViolation);
    }

    let query = r"
        UPDATE memberships
        SET role = $3::org_role, updated_at = NOW()
        WHERE organization_id = $1 AND principal_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(organization_id)
        .bind(target_principal_id)
        .bind(new_role.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update membership role")?;

    tx.commit().await.context("commit role-change transaction")?;
    Ok(RoleChangeOutcome::Updated)
}

/// Remove a membership, refusing removals that would strand the organization,
/// and re-point the removed principal's organization references.
pub(super) async fn remove_member(
    pool: &PgPool,
    organization_id: Uuid,
    target_principal_id: Uuid,
) -> Result<RemoveOutcome> {
    let mut tx = pool.begin().await.context("begin remove transaction")?;
    lock_organization(&mut tx, organization_id).await?;

    let Some((role, status)) = fetch_membership(&mut tx, organization_id, target_principal_id)
        .await?
    else {
        let _ = tx.rollback().await;
        return Ok(RemoveOutcome::NotFound);
    };

    if role == OrgRole::Owner
        && status == MembershipStatus::Active
        && count_other_active_owners(&mut tx, organization_id, target_principal_id).await? == 0
    {
        let _ = tx.rollback().await;
        return Ok(RemoveOutcome::SoleOwnerViolation);
    }

    let query = r"
        DELETE FROM memberships
        WHERE organization_id = $1 AND principal_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(organization_id)
        .bind(target_principal_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete membership")?;

    reassign_organization_refs(&mut tx, organization_id, target_principal_id).await?;

    tx.commit().await.context("commit remove transaction")?;
    Ok(RemoveOutcome::Removed)
}

/// Null out references to the departed organization and, when another active
/// membership exists, adopt it as both the active and default organization.
async fn reassign_organization_refs(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    organization_id: Uuid,
    principal_id: Uuid,
) -> Result<()> {
    let query = r"
        SELECT active_organization_id, default_organization_id
        FROM principals
        WHERE id = $1
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to fetch organization references")?;

    let Some(row) = row else {
        return Ok(());
    };

    let active_ref: Option<Uuid> = row.get("active_organization_id");
    let default_ref: Option<Uuid> = row.get("default_organization_id");
    if active_ref != Some(organization_id) && default_ref != Some(organization_id) {
        return Ok(());
    }

    let query = r"
        SELECT organization_id
        FROM memberships
        WHERE principal_id = $1 AND status = 'active'
        ORDER BY updated_at DESC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let adopted: Option<Uuid> = sqlx::query(query)
        .bind(principal_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to find adoption candidate")?
        .map(|row| row.get("organization_id"));

    let (active, default) = match adopted {
        Some(org) => (Some(org), Some(org)),
        None => (
            active_ref.filter(|id| *id != organization_id),
            default_ref.filter(|id| *id != organization_id),
        ),
    };

    crate::api::handlers::auth::set_organization_refs(tx, principal_id, active, default).await
}

/// Serialize membership mutations for one organization.
async fn lock_organization(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    organization_id: Uuid,
) -> Result<()> {
    let query = "SELECT pg_advisory_xact_lock(hashtext($1::text)::bigint)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(organization_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to take organization lock")?;
    Ok(())
}

/// Role and status of a membership, inside the caller's transaction.
async fn fetch_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    organization_id: Uuid,
    principal_id: Uuid,
) -> Result<Option<(OrgRole, MembershipStatus)>> {
    let query = r"
        SELECT role::text AS role, status::text AS status
        FROM memberships
        WHERE organization_id = $1 AND principal_id = $2
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(organization_id)
        .bind(principal_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to fetch membership")?;

    Ok(row.and_then(|row| {
        let role = OrgRole::parse(&row.get::<String, _>("role"))?;
        let status = MembershipStatus::parse(&row.get::<String, _>("status"))?;
        Some((role, status))
    }))
}

/// Active owners of the organization other than `excluded_principal_id`.
async fn count_other_active_owners(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    organization_id: Uuid,
    excluded_principal_id: Uuid,
) -> Result<i64> {
    let query = r"
        SELECT COUNT(*) AS owners
        FROM memberships
        WHERE organization_id = $1
          AND principal_id <> $2
          AND role = 'owner'
          AND status = 'active'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(organization_id)
        .bind(excluded_principal_id)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to count active owners")?;
    Ok(row.get("owners"))
}

#[cfg(test)]
mod tests {
    use super::{ProvisionOutcome, RemoveOutcome, RoleChangeOutcome};

    #[test]
    fn outcome_debug_names() {
        assert!(format!("{:?}", ProvisionOutcome::UserExists).contains("UserExists"));
        assert!(format!("{:?}", RoleChangeOutcome::SoleOwnerViolation)
            .contains("SoleOwnerViolation"));
        assert!(format!("{:?}", RemoveOutcome::Removed).contains("Removed"));
    }
}
