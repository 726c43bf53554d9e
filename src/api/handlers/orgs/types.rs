//! Request/response types and tenant enums for organization-scoped APIs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role a membership grants within an organization.
///
/// The role lattice is `member < owner`; authorization checks use
/// [`OrgRole::allows`] rather than ad-hoc comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Member,
    Owner,
}

impl OrgRole {
    /// Canonical string matching the `org_role` enum values in the database.
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Owner => "owner",
        }
    }

    /// Parse a role from its wire or database representation.
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Self::Member),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    /// `true` when this role is at least `required` in the role lattice.
    pub(crate) fn allows(self, required: Self) -> bool {
        match required {
            Self::Member => true,
            Self::Owner => matches!(self, Self::Owner),
        }
    }
}

/// Lifecycle state of a membership edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    PendingUserSetup,
    Inactive,
}

impl MembershipStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingUserSetup => "pending_user_setup",
            Self::Inactive => "inactive",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "pending_user_setup" => Some(Self::PendingUserSetup),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Closed set of organization currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Currency {
    INR,
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl Currency {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::INR => "INR",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "INR" => Some(Self::INR),
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "CAD" => Some(Self::CAD),
            "AUD" => Some(Self::AUD),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationResponse {
    pub id: String,
    pub name: String,
    pub industry: Option<String>,
    pub timezone: String,
    pub currency: Currency,
    pub settings: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub timezone: Option<String>,
    /// Currency code; validated against the closed set, not free-form.
    pub currency: Option<String>,
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub principal_id: String,
    pub email: String,
    pub display_name: String,
    pub role: OrgRole,
    pub status: MembershipStatus,
    pub invited_by: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionMemberRequest {
    pub email: String,
    pub name: String,
    /// Defaults to `member`; assigning `owner` is restricted to owners.
    pub role: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionMemberResponse {
    pub principal_id: String,
    /// Single-use setup token; the caller delivers it out of band.
    pub setup_token: String,
    pub setup_url: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRoleRequest {
    pub new_role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_lattice_orders_member_below_owner() {
        assert!(OrgRole::Owner.allows(OrgRole::Owner));
        assert!(OrgRole::Owner.allows(OrgRole::Member));
        assert!(OrgRole::Member.allows(OrgRole::Member));
        assert!(!OrgRole::Member.allows(OrgRole::Owner));
    }

    #[test]
    fn role_round_trips_through_db_strings() {
        assert_eq!(OrgRole::parse("owner"), Some(OrgRole::Owner));
        assert_eq!(OrgRole::parse("member"), Some(OrgRole::Member));
        assert_eq!(OrgRole::parse("admin"), None);
        assert_eq!(OrgRole::Owner.as_str(), "owner");
    }

    #[test]
    fn membership_status_round_trips() {
        for status in [
            MembershipStatus::Active,
            MembershipStatus::PendingUserSetup,
            MembershipStatus::Inactive,
        ] {
            assert_eq!(MembershipStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MembershipStatus::parse("deleted"), None);
    }

    #[test]
    fn currency_closed_set() {
        for code in ["INR", "USD", "EUR", "GBP", "CAD", "AUD"] {
            let currency = Currency::parse(code).expect("known code");
            assert_eq!(currency.as_str(), code);
        }
        assert_eq!(Currency::parse("JPY"), None);
        assert_eq!(Currency::parse("usd"), None);
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&OrgRole::Owner).unwrap();
        assert_eq!(json, "\"owner\"");
        let role: OrgRole = serde_json::from_str("\"member\"").unwrap();
        assert_eq!(role, OrgRole::Member);
    }
}
