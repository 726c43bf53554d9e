//! Organization and membership endpoints.
//!
//! Organizations are the tenant boundary. Every handler here operates on the
//! session's *active* organization as resolved by the request context, so the
//! URL surface never names a foreign tenant. Write operations require the
//! `owner` role; reads are open to any active member. Membership mutations
//! enforce the sole-owner rule: an organization can never lose its last
//! active owner.
//!
//! Flow Overview:
//! 1) Authenticate via bearer token and resolve the active organization.
//! 2) Enforce the required role through the request context gates.
//! 3) Perform registry reads/writes scoped by the resolved organization id.

pub(crate) mod members;
pub(crate) mod organizations;
pub(crate) mod types;

mod storage;

#[cfg(test)]
mod tests;
