use crate::api;
use crate::api::handlers::auth::AuthConfig;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub signing_secret: String,
    pub token_ttl_seconds: i64,
    pub setup_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(
        SecretString::from(args.signing_secret),
        args.frontend_base_url,
    )
    .with_token_ttl_seconds(args.token_ttl_seconds)
    .with_setup_token_ttl_seconds(args.setup_token_ttl_seconds)
    .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds);

    api::new(args.port, args.dsn, auth_config).await
}
