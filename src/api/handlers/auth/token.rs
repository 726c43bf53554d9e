//! Stateless session token issuance and verification.
//!
//! Tokens are HS256-signed bearer credentials carrying the principal id and
//! the active organization id. They are minted on every authentication-changing
//! flow and verified on every request; there is no server-side session record
//! and no revocation list, so tokens live until their natural expiry.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token encoding failed")]
    Encode,
}

/// Claims embedded in every session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Subject — principal id (UUID string).
    pub sub: String,
    /// Active organization id (UUID string), absent when no org is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID (UUID string).
    pub jti: String,
}

impl SessionClaims {
    /// Parse the subject claim back into a principal id.
    pub(crate) fn principal_id(&self) -> Result<Uuid, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }

    /// Parse the organization claim, when present.
    pub(crate) fn organization_id(&self) -> Result<Option<Uuid>, TokenError> {
        self.org
            .as_deref()
            .map(|org| org.parse().map_err(|_| TokenError::Invalid))
            .transpose()
    }
}

/// Unix seconds used for issued-at and expiry claims.
pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Mint a signed session token for a principal and optional active org.
pub(crate) fn mint(
    secret: &SecretString,
    principal_id: Uuid,
    organization_id: Option<Uuid>,
    ttl_seconds: i64,
) -> Result<String, TokenError> {
    let now = now_unix_seconds();
    let claims = SessionClaims {
        sub: principal_id.to_string(),
        org: organization_id.map(|id| id.to_string()),
        iat: now,
        exp: now + ttl_seconds,
        jti: Uuid::new_v4().to_string(),
    };

    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|_| TokenError::Encode)
}

/// Verify signature and expiry, returning the decoded claims.
///
/// Existence of the principal or organization is not checked here; that is
/// the request context resolver's job.
pub(crate) fn verify(secret: &SecretString, token: &str) -> Result<SessionClaims, TokenError> {
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["sub", "exp", "iat"]);

    decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret() -> SecretString {
        SecretString::from("a-test-secret-at-least-32-bytes-long!!")
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let secret = test_secret();
        let principal_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();

        let token = mint(&secret, principal_id, Some(org_id), 300).unwrap();
        let claims = verify(&secret, &token).unwrap();

        assert_eq!(claims.principal_id().unwrap(), principal_id);
        assert_eq!(claims.organization_id().unwrap(), Some(org_id));
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn org_claim_is_optional() {
        let secret = test_secret();
        let token = mint(&secret, Uuid::new_v4(), None, 300).unwrap();
        let claims = verify(&secret, &token).unwrap();
        assert_eq!(claims.org, None);
        assert_eq!(claims.organization_id().unwrap(), None);
    }

    #[test]
    fn jti_is_unique() {
        let secret = test_secret();
        let principal_id = Uuid::new_v4();
        let t1 = mint(&secret, principal_id, None, 300).unwrap();
        let t2 = mint(&secret, principal_id, None, 300).unwrap();
        let c1 = verify(&secret, &t1).unwrap();
        let c2 = verify(&secret, &t2).unwrap();
        assert_ne!(c1.jti, c2.jti);
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = test_secret();
        let token = mint(&secret, Uuid::new_v4(), None, -10).unwrap();
        assert!(matches!(verify(&secret, &token), Err(TokenError::Expired)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let secret = test_secret();
        let other = SecretString::from("another-secret-entirely-different!!!!");
        let token = mint(&secret, Uuid::new_v4(), None, 300).unwrap();
        assert!(matches!(verify(&other, &token), Err(TokenError::Invalid)));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let secret = test_secret();
        let token = mint(&secret, Uuid::new_v4(), None, 300).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        assert!(verify(&secret, &tampered).is_err());
    }
}
