//! Auth handlers and supporting modules.
//!
//! This module coordinates credential lifecycles, session tokens, and the
//! per-request context resolution every protected endpoint goes through.
//!
//! ## Flows
//!
//! - **Owner self-registration** creates a principal, its organization, and
//!   the owner membership atomically.
//! - **Member provisioning** (under `orgs`) creates a provisional principal
//!   with a single-use setup token; **setup completion** consumes the token,
//!   sets the password, and activates the pending membership.
//! - **Login** verifies the password and reconciles the session's active
//!   organization from the persisted references and the active memberships.
//! - **Organization switch** re-points the active organization and mints a
//!   fresh token; old tokens expire naturally.
//!
//! All of these return a fresh session token in the response envelope.

pub(crate) mod login;
pub(crate) mod me;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod reset;
pub(crate) mod session;
pub(crate) mod setup;
pub(crate) mod types;

mod password;
mod state;
mod storage;
mod token;
mod utils;

pub use state::{AuthConfig, AuthState};

pub(crate) use storage::{provision_principal, set_organization_refs, ProvisionPrincipalOutcome};
pub(crate) use utils::{
    build_setup_url, generate_capability_token, hash_capability_token, is_unique_violation,
    normalize_email, valid_email,
};
