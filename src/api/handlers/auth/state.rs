//! Auth state and configuration.
//!
//! The signing secret and TTLs are read once at startup and never mutated;
//! handlers reach them through the shared [`AuthState`] extension.

use secrecy::SecretString;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 5 * 60 * 60;
const DEFAULT_SETUP_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    signing_secret: SecretString,
    frontend_base_url: String,
    token_ttl_seconds: i64,
    setup_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(signing_secret: SecretString, frontend_base_url: String) -> Self {
        Self {
            signing_secret,
            frontend_base_url,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            setup_token_ttl_seconds: DEFAULT_SETUP_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_setup_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.setup_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    pub(crate) fn signing_secret(&self) -> &SecretString {
        &self.signing_secret
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    pub(crate) fn setup_token_ttl_seconds(&self) -> i64 {
        self.setup_token_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, AuthState};
    use secrecy::SecretString;

    fn test_config() -> AuthConfig {
        AuthConfig::new(
            SecretString::from("a-test-secret-at-least-32-bytes-long!!"),
            "https://app.example.com".to_string(),
        )
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = test_config();

        assert_eq!(config.frontend_base_url(), "https://app.example.com");
        assert_eq!(config.token_ttl_seconds(), super::DEFAULT_TOKEN_TTL_SECONDS);
        assert_eq!(
            config.setup_token_ttl_seconds(),
            super::DEFAULT_SETUP_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.reset_token_ttl_seconds(),
            super::DEFAULT_RESET_TOKEN_TTL_SECONDS
        );

        let config = config
            .with_token_ttl_seconds(60)
            .with_setup_token_ttl_seconds(120)
            .with_reset_token_ttl_seconds(30);

        assert_eq!(config.token_ttl_seconds(), 60);
        assert_eq!(config.setup_token_ttl_seconds(), 120);
        assert_eq!(config.reset_token_ttl_seconds(), 30);
    }

    #[test]
    fn auth_state_exposes_config() {
        let state = AuthState::new(test_config());
        assert_eq!(state.config().frontend_base_url(), "https://app.example.com");
    }
}
