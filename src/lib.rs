//! # Horizon (Multi-Tenant Operations Back-End)
//!
//! `horizon` is the back-end for a startup-operations application. It stores
//! financial and organizational records for many companies at once, so the
//! core of the service is the access-control and data-scoping subsystem:
//! authentication, the active-organization context, role checks, and the
//! guarantee that every query stays inside the caller's organization.
//!
//! ## Tenant Model (Organizations & Memberships)
//!
//! Organizations are the tenant boundary. A principal reaches an organization
//! only through a membership edge carrying a role (`member` or `owner`) and a
//! status (`active`, `pending_user_setup`, `inactive`).
//!
//! - **Sole Owner:** every organization keeps at least one active `owner`
//!   membership; role changes and removals that would break this are refused.
//! - **Scoping:** domain records carry the organization id, writes inject it
//!   from the request context, and cross-tenant reads surface as `404`.
//!
//! ## Authentication
//!
//! Passwords are hashed with Argon2id. Sessions are stateless bearer tokens
//! (HS256) carrying the principal id and the active organization id; they are
//! minted on registration, login, setup completion, and organization switch,
//! and expire naturally. Provisioned members activate through a single-use,
//! time-limited setup token delivered out of band.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
