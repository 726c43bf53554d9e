//! API handlers and shared utilities for Horizon.
//!
//! This module organizes the service's route handlers: authentication flows,
//! organization and membership management, and the organization-scoped domain
//! collections. Error kinds and their HTTP mappings live in `error`.

pub mod auth;
pub mod error;
pub mod expenses;
pub mod health;
pub mod orgs;
pub mod root;

pub(crate) use error::ApiError;
