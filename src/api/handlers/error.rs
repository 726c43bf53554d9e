//! Error kinds shared by the API handlers and their HTTP mappings.
//!
//! Handlers never leak store details or email existence; database errors are
//! logged server-side and surfaced as bare `500` responses.

use axum::{http::StatusCode, response::IntoResponse};
use tracing::error;

#[derive(Debug)]
pub(crate) enum ApiError {
    /// Missing or unusable bearer credentials.
    Unauthenticated,
    /// Bearer token failed signature or claim validation.
    InvalidToken,
    /// Bearer token is past its expiry.
    ExpiredToken,
    /// Principal authenticated but has not completed account setup.
    SetupIncomplete,
    /// Endpoint needs an active organization that the context does not carry.
    OrgContextRequired,
    /// Context role is not in the endpoint's allowed set.
    InsufficientRole,
    /// Email already belongs to another principal.
    DuplicateEmail,
    /// Provisioning target email belongs to an already-active principal.
    UserExists,
    /// Setup-token consumption for a principal that is already active.
    AlreadyActive,
    /// Change would leave the organization without an active owner.
    SoleOwnerViolation,
    /// Setup or reset capability token rejected (unknown, used, or expired).
    InvalidCapability,
    /// Malformed input, unrecognized enum value, password too short.
    Validation(&'static str),
    /// Resource absent or belonging to another tenant; the two are never
    /// distinguished in responses.
    NotFound,
    /// Store-level failure; safe for the caller to retry.
    Database(sqlx::Error),
    /// Any other internal failure; details stay in the logs.
    Internal(anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Authentication required.").into_response()
            }
            Self::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "Invalid session token.").into_response()
            }
            Self::ExpiredToken => {
                (StatusCode::UNAUTHORIZED, "Session token expired.").into_response()
            }
            Self::SetupIncomplete => (
                StatusCode::FORBIDDEN,
                "Account setup is incomplete. Use your setup link to choose a password.",
            )
                .into_response(),
            Self::OrgContextRequired => (
                StatusCode::FORBIDDEN,
                "No active organization. Select an organization and retry.",
            )
                .into_response(),
            Self::InsufficientRole => (
                StatusCode::FORBIDDEN,
                "Insufficient role for this operation.",
            )
                .into_response(),
            Self::DuplicateEmail => {
                (StatusCode::BAD_REQUEST, "This email cannot be used.").into_response()
            }
            Self::UserExists => (
                StatusCode::BAD_REQUEST,
                "A user with this email already exists.",
            )
                .into_response(),
            Self::AlreadyActive => {
                (StatusCode::BAD_REQUEST, "Account is already active.").into_response()
            }
            Self::SoleOwnerViolation => (
                StatusCode::BAD_REQUEST,
                "Organizations must retain at least one active owner.",
            )
                .into_response(),
            Self::InvalidCapability => {
                (StatusCode::BAD_REQUEST, "Invalid or expired token.").into_response()
            }
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Database(err) => {
                error!("Database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn status_mapping_matches_contract() {
        assert_eq!(
            ApiError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::SetupIncomplete.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::OrgContextRequired.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::InsufficientRole.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::DuplicateEmail.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::SoleOwnerViolation.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Database(sqlx::Error::RowNotFound)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
