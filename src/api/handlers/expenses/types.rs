//! Request/response types for the expenses collection.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseRequest {
    pub description: String,
    pub amount_cents: i64,
    pub category: Option<String>,
    /// `YYYY-MM-DD`; defaults to today.
    pub incurred_on: Option<String>,
    /// Principal who paid; must be an active member of the organization.
    pub paid_by: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseResponse {
    pub id: String,
    pub description: String,
    pub amount_cents: i64,
    pub category: String,
    pub incurred_on: String,
    pub paid_by: Option<String>,
    pub created_by: String,
    pub created_at: String,
}
