//! Expense records, the template for organization-scoped domain collections.
//!
//! Storage functions only accept an `OrgScope`, so every read and write is
//! confined to the request's organization; see `crate::api::scope` for the
//! contract the other domain collections follow.

pub(crate) mod records;
pub(crate) mod types;

mod storage;
