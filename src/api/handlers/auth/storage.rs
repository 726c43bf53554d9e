//! Database helpers for principals, credentials, and authentication flows.
//!
//! Every authentication-changing flow here is a single transaction: either all
//! of its writes commit or none do. Capability tokens are looked up by their
//! SHA-256 digest; raw values never reach the database.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

const TIMESTAMP_FORMAT: &str = r#"YYYY-MM-DD"T"HH24:MI:SS"Z""#;

/// Principal as materialized for a request context; the password hash is
/// deliberately never selected.
#[derive(Debug, Clone)]
pub(crate) struct PrincipalRow {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) is_active: bool,
    pub(crate) is_platform_admin: bool,
    pub(crate) active_organization_id: Option<Uuid>,
    pub(crate) default_organization_id: Option<Uuid>,
    pub(crate) preferences: serde_json::Value,
    pub(crate) last_login_at: Option<String>,
    pub(crate) created_at: String,
}

/// Minimal fields needed to verify a login attempt.
pub(super) struct CredentialRow {
    pub(super) id: Uuid,
    pub(super) password_hash: Option<String>,
    pub(super) is_active: bool,
}

/// Active membership of a principal, most recently updated first.
#[derive(Debug, Clone)]
pub(crate) struct ActiveMembershipRow {
    pub(crate) organization_id: Uuid,
    pub(crate) organization_name: String,
    pub(crate) role: String,
}

#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created {
        principal_id: Uuid,
        organization_id: Uuid,
    },
    DuplicateEmail,
}

#[derive(Debug)]
pub(crate) enum ProvisionPrincipalOutcome {
    Created(Uuid),
    Reused(Uuid),
    UserExists,
}

#[derive(Debug)]
pub(super) enum SetupOutcome {
    Activated {
        principal_id: Uuid,
        organization_id: Option<Uuid>,
        role: Option<String>,
    },
    AlreadyActive,
    Invalid,
}

#[derive(Debug)]
pub(super) enum ResetOutcome {
    Reset {
        principal_id: Uuid,
        organization_id: Option<Uuid>,
        role: Option<String>,
    },
    Invalid,
}

/// Load a principal by id for the request context, excluding secret material.
pub(crate) async fn fetch_principal(pool: &PgPool, id: Uuid) -> Result<Option<PrincipalRow>> {
    let query = format!(
        r"
        SELECT id, email, display_name, is_active, is_platform_admin,
               active_organization_id, default_organization_id,
               preferences::text AS preferences,
               to_char(last_login_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS last_login_at,
               to_char(created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at
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
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch principal")?;

    Ok(row.map(|row| PrincipalRow {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        is_active: row.get("is_active"),
        is_platform_admin: row.get("is_platform_admin"),
        active_organization_id: row.get("active_organization_id"),
        default_organization_id: row.get("default_organization_id"),
        preferences: row
            .get::<Option<String>, _>("preferences")
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(serde_json::Value::Null),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
    }))
}

/// Look up credentials by email for a login attempt.
pub(super) async fn lookup_credentials(
    pool: &PgPool,
    email_normalized: &str,
) -> Result<Option<CredentialRow>> {
    let query = r"
        SELECT id, password_hash, is_active
        FROM principals
        WHERE lower(email) = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_normalized)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    Ok(row.map(|row| CredentialRow {
        id: row.get("id"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
    }))
}

/// Owner self-registration: principal, organization, and owner membership are
/// created in one transaction, and the principal's organization references are
/// pointed at the new organization.
pub(super) async fn register_owner(
    pool: &PgPool,
    name: &str,
    email_normalized: &str,
    password_hash: &str,
    organization_name: &str,
) -> Result<RegisterOutcome> {
    let mut tx = pool.begin().await.context("begin register transaction")?;

    let query = r"
        INSERT INTO principals (email, display_name, password_hash, is_active)
        VALUES ($1, $2, $3, true)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_normalized)
        .bind(name)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let principal_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(RegisterOutcome::DuplicateEmail);
            }
            return Err(err).context("failed to insert principal");
        }
    };

    let query = r"
        INSERT INTO organizations (name, created_by)
        VALUES ($1, $2)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let organization_id: Uuid = sqlx::query(query)
        .bind(organization_name)
        .bind(principal_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert organization")?
        .get("id");

    let query = r"
        INSERT INTO memberships (principal_id, organization_id, role, status)
        VALUES ($1, $2, 'owner', 'active')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(organization_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert owner membership")?;

    set_organization_refs(&mut tx, principal_id, Some(organization_id), Some(organization_id))
        .await?;

    tx.commit().await.context("commit register transaction")?;

    Ok(RegisterOutcome::Created {
        principal_id,
        organization_id,
    })
}

/// Create or reuse a provisional principal inside a caller-owned transaction.
///
/// An email held by an active principal refuses provisioning; an inactive
/// record with no live membership is reused with a fresh setup token.
pub(crate) async fn provision_principal(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
    email_normalized: &str,
    setup_token_hash: &[u8],
    setup_ttl_seconds: i64,
) -> Result<ProvisionPrincipalOutcome> {
    let query = r"
        SELECT id, is_active
        FROM principals
        WHERE lower(email) = $1
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let existing = sqlx::query(query)
        .bind(email_normalized)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup principal for provisioning")?;

    if let Some(row) = existing {
        let principal_id: Uuid = row.get("id");
        let is_active: bool = row.get("is_active");
        if is_active {
            return Ok(ProvisionPrincipalOutcome::UserExists);
        }

        let query = r"
            SELECT EXISTS(
                SELECT 1 FROM memberships
                WHERE principal_id = $1 AND status <> 'inactive'
            ) AS live
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let live: bool = sqlx::query(query)
            .bind(principal_id)
            .fetch_one(&mut **tx)
            .instrument(span)
            .await
            .context("failed to check live memberships")?
            .get("live");
        if live {
            return Ok(ProvisionPrincipalOutcome::UserExists);
        }

        let query = r"
            UPDATE principals
            SET display_name = $2,
                setup_token_hash = $3,
                setup_token_expires_at = NOW() + ($4 * INTERVAL '1 second'),
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(principal_id)
            .bind(name)
            .bind(setup_token_hash)
            .bind(setup_ttl_seconds)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to refresh provisional principal")?;

        return Ok(ProvisionPrincipalOutcome::Reused(principal_id));
    }

    let query = r"
        INSERT INTO principals
            (email, display_name, is_active, setup_token_hash, setup_token_expires_at)
        VALUES ($1, $2, false, $3, NOW() + ($4 * INTERVAL '1 second'))
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_normalized)
        .bind(name)
        .bind(setup_token_hash)
        .bind(setup_ttl_seconds)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(ProvisionPrincipalOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(ProvisionPrincipalOutcome::UserExists),
        Err(err) => Err(err).context("failed to insert provisional principal"),
    }
}

/// Active memberships of a principal, most recently updated first.
pub(crate) async fn fetch_active_memberships(
    pool: &PgPool,
    principal_id: Uuid,
) -> Result<Vec<ActiveMembershipRow>> {
    let query = r"
        SELECT m.organization_id, o.name AS organization_name, m.role::text AS role
        FROM memberships m
        JOIN organizations o ON o.id = m.organization_id
        WHERE m.principal_id = $1 AND m.status = 'active'
        ORDER BY m.updated_at DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(principal_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch active memberships")?;

    Ok(rows
        .into_iter()
        .map(|row| ActiveMembershipRow {
            organization_id: row.get("organization_id"),
            organization_name: row.get("organization_name"),
            role: row.get("role"),
        })
        .collect())
}

/// Pick the session's active organization for a fresh login.
///
/// The first choice that maps to an active membership wins: the persisted
/// active reference, then the default reference, then the most recent active
/// membership.
pub(super) fn choose_active_org(
    active_ref: Option<Uuid>,
    default_ref: Option<Uuid>,
    memberships: &[ActiveMembershipRow],
) -> Option<Uuid> {
    for candidate in [active_ref, default_ref].into_iter().flatten() {
        if memberships.iter().any(|m| m.organization_id == candidate) {
            return Some(candidate);
        }
    }
    memberships.first().map(|m| m.organization_id)
}

/// Record a successful login: last-login timestamp and the (possibly changed)
/// active organization reference.
pub(super) async fn record_login(
    pool: &PgPool,
    principal_id: Uuid,
    active_organization_id: Option<Uuid>,
) -> Result<()> {
    let query = r"
        UPDATE principals
        SET last_login_at = NOW(),
            active_organization_id = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(active_organization_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record login")?;
    Ok(())
}

/// Consume a setup token: set the password, activate the principal, promote
/// the unique pending membership, and adopt its organization as active and
/// default. All in one transaction.
pub(super) async fn consume_setup_token(
    pool: &PgPool,
    token_hash: &[u8],
    password_hash: &str,
) -> Result<SetupOutcome> {
    let mut tx = pool.begin().await.context("begin setup transaction")?;

    let query = r"
        SELECT id, is_active, (setup_token_expires_at > NOW()) AS live
        FROM principals
        WHERE setup_token_hash = $1
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup setup token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(SetupOutcome::Invalid);
    };

    let principal_id: Uuid = row.get("id");
    let is_active: bool = row.get("is_active");
    let live: bool = row.get::<Option<bool>, _>("live").unwrap_or(false);

    // Expiry at exactly the stored instant counts as expired.
    if !live {
        let _ = tx.rollback().await;
        return Ok(SetupOutcome::Invalid);
    }
    if is_active {
        let _ = tx.rollback().await;
        return Ok(SetupOutcome::AlreadyActive);
    }

    activate_principal(&mut tx, principal_id, password_hash, "setup").await?;
    let adopted = activate_pending_membership(&mut tx, principal_id).await?;

    tx.commit().await.context("commit setup transaction")?;

    Ok(SetupOutcome::Activated {
        principal_id,
        organization_id: adopted.as_ref().map(|(org, _)| *org),
        role: adopted.map(|(_, role)| role),
    })
}

/// Attach a reset token to the principal owning `email`, if any.
///
/// Returns whether a principal matched; callers respond identically either
/// way to avoid account probing.
pub(super) async fn create_reset_token(
    pool: &PgPool,
    email_normalized: &str,
    token_hash: &[u8],
    reset_ttl_seconds: i64,
) -> Result<bool> {
    let query = r"
        UPDATE principals
        SET reset_token_hash = $2,
            reset_token_expires_at = NOW() + ($3 * INTERVAL '1 second'),
            updated_at = NOW()
        WHERE lower(email) = $1
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_normalized)
        .bind(token_hash)
        .bind(reset_ttl_seconds)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to create reset token")?;
    Ok(row.is_some())
}

/// Consume a reset token: set the new password and clear the token. A
/// not-yet-active principal is activated, including its pending membership.
pub(super) async fn consume_reset_token(
    pool: &PgPool,
    token_hash: &[u8],
    password_hash: &str,
) -> Result<ResetOutcome> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = r"
        SELECT id, is_active, active_organization_id,
               (reset_token_expires_at > NOW()) AS live
        FROM principals
        WHERE reset_token_hash = $1
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup reset token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(ResetOutcome::Invalid);
    };

    let principal_id: Uuid = row.get("id");
    let was_active: bool = row.get("is_active");
    let active_ref: Option<Uuid> = row.get("active_organization_id");
    let live: bool = row.get::<Option<bool>, _>("live").unwrap_or(false);
    if !live {
        let _ = tx.rollback().await;
        return Ok(ResetOutcome::Invalid);
    }

    activate_principal(&mut tx, principal_id, password_hash, "reset").await?;

    let (organization_id, role) = if was_active {
        match active_ref {
            Some(org) => {
                let role = membership_role(&mut tx, principal_id, org).await?;
                (role.is_some().then_some(org), role)
            }
            None => (None, None),
        }
    } else {
        let adopted = activate_pending_membership(&mut tx, principal_id).await?;
        (
            adopted.as_ref().map(|(org, _)| *org),
            adopted.map(|(_, role)| role),
        )
    };

    tx.commit().await.context("commit reset transaction")?;

    Ok(ResetOutcome::Reset {
        principal_id,
        organization_id,
        role,
    })
}

/// Role of the principal's active membership in an organization, if any.
async fn membership_role(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    principal_id: Uuid,
    organization_id: Uuid,
) -> Result<Option<String>> {
    let query = r"
        SELECT role::text AS role
        FROM memberships
        WHERE principal_id = $1 AND organization_id = $2 AND status = 'active'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .bind(organization_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to fetch membership role")?;
    Ok(row.map(|row| row.get("role")))
}

/// Set the password hash, flip the activation flag, and clear both capability
/// tokens. The `flow` label only feeds the error context.
async fn activate_principal(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    principal_id: Uuid,
    password_hash: &str,
    flow: &'static str,
) -> Result<()> {
    let query = r"
        UPDATE principals
        SET password_hash = $2,
            is_active = true,
            setup_token_hash = NULL,
            setup_token_expires_at = NULL,
            reset_token_hash = NULL,
            reset_token_expires_at = NULL,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to activate principal during {flow}"))?;
    Ok(())
}

/// Promote the unique `pending_user_setup` membership to `active` and point
/// the principal's organization references at it. Returns the adopted
/// organization and role.
async fn activate_pending_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    principal_id: Uuid,
) -> Result<Option<(Uuid, String)>> {
    let query = r"
        UPDATE memberships
        SET status = 'active', updated_at = NOW()
        WHERE principal_id = $1 AND status = 'pending_user_setup'
        RETURNING organization_id, role::text AS role
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to activate pending membership")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let organization_id: Uuid = row.get("organization_id");
    set_organization_refs(tx, principal_id, Some(organization_id), Some(organization_id)).await?;

    Ok(Some((organization_id, row.get("role"))))
}

/// Point a principal's active and default organization references.
pub(crate) async fn set_organization_refs(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    principal_id: Uuid,
    active: Option<Uuid>,
    default: Option<Uuid>,
) -> Result<()> {
    let query = r"
        UPDATE principals
        SET active_organization_id = $2,
            default_organization_id = $3,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(active)
        .bind(default)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to set organization references")?;
    Ok(())
}

/// Persist a new active-organization choice after a switch.
pub(super) async fn persist_active_organization(
    pool: &PgPool,
    principal_id: Uuid,
    organization_id: Uuid,
) -> Result<()> {
    let query = r"
        UPDATE principals
        SET active_organization_id = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(organization_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to persist active organization")?;
    Ok(())
}

/// Membership id and role for (principal, organization) when active.
pub(crate) async fn resolve_org_context(
    pool: &PgPool,
    principal_id: Uuid,
    organization_id: Uuid,
) -> Result<Option<(Uuid, String)>> {
    let query = r"
        SELECT id, role::text AS role
        FROM memberships
        WHERE principal_id = $1 AND organization_id = $2 AND status = 'active'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .bind(organization_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to resolve org context")?;
    Ok(row.map(|row| (row.get("id"), row.get("role"))))
}

#[cfg(test)]
mod tests {
    use super::{choose_active_org, ActiveMembershipRow};
    use uuid::Uuid;

    fn membership(org: Uuid) -> ActiveMembershipRow {
        ActiveMembershipRow {
            organization_id: org,
            organization_name: "Acme".to_string(),
            role: "member".to_string(),
        }
    }

    #[test]
    fn active_ref_wins_when_membership_is_active() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let memberships = vec![membership(b), membership(a)];
        assert_eq!(
            choose_active_org(Some(a), Some(b), &memberships),
            Some(a)
        );
    }

    #[test]
    fn default_ref_is_second_choice() {
        let stale = Uuid::new_v4();
        let b = Uuid::new_v4();
        let memberships = vec![membership(b)];
        assert_eq!(
            choose_active_org(Some(stale), Some(b), &memberships),
            Some(b)
        );
    }

    #[test]
    fn most_recent_membership_is_fallback() {
        let recent = Uuid::new_v4();
        let older = Uuid::new_v4();
        let memberships = vec![membership(recent), membership(older)];
        assert_eq!(choose_active_org(None, None, &memberships), Some(recent));
    }

    #[test]
    fn no_memberships_means_no_org() {
        let stale = Uuid::new_v4();
        assert_eq!(choose_active_org(Some(stale), Some(stale), &[]), None);
    }
}
