//! Authentication-related CLI arguments: token signing, TTLs, setup links.

use anyhow::{Context, Result};
use clap::{Arg, Command};

pub const ARG_SIGNING_SECRET: &str = "signing-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_SETUP_TOKEN_TTL_SECONDS: &str = "setup-token-ttl-seconds";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_SECRET)
                .long(ARG_SIGNING_SECRET)
                .help("Symmetric secret used to sign session tokens")
                .env("HORIZON_SIGNING_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token lifetime in seconds")
                .default_value("18000")
                .env("HORIZON_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SETUP_TOKEN_TTL_SECONDS)
                .long(ARG_SETUP_TOKEN_TTL_SECONDS)
                .help("Setup token lifetime in seconds (at most 7 days)")
                .default_value("604800")
                .env("HORIZON_SETUP_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password-reset token lifetime in seconds (at most 1 hour)")
                .default_value("3600")
                .env("HORIZON_RESET_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used to build setup and reset links")
                .default_value("http://localhost:3000")
                .env("HORIZON_FRONTEND_BASE_URL"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub signing_secret: String,
    pub token_ttl_seconds: i64,
    pub setup_token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub frontend_base_url: String,
}

impl Options {
    /// Extract validated auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or a TTL exceeds its cap.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let signing_secret = matches
            .get_one::<String>(ARG_SIGNING_SECRET)
            .cloned()
            .context("missing required argument: --signing-secret")?;

        let token_ttl_seconds = matches
            .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(18_000);
        let setup_token_ttl_seconds = matches
            .get_one::<i64>(ARG_SETUP_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(604_800);
        let reset_token_ttl_seconds = matches
            .get_one::<i64>(ARG_RESET_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(3_600);

        if setup_token_ttl_seconds > 604_800 {
            anyhow::bail!("setup token TTL must not exceed 7 days");
        }
        if reset_token_ttl_seconds > 3_600 {
            anyhow::bail!("reset token TTL must not exceed 1 hour");
        }

        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            signing_secret,
            token_ttl_seconds,
            setup_token_ttl_seconds,
            reset_token_ttl_seconds,
            frontend_base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_for(args: Vec<&str>) -> clap::ArgMatches {
        crate::cli::commands::new().get_matches_from(args)
    }

    #[test]
    fn defaults_apply() {
        temp_env::with_vars(
            [
                ("HORIZON_TOKEN_TTL_SECONDS", None::<&str>),
                ("HORIZON_SETUP_TOKEN_TTL_SECONDS", None),
                ("HORIZON_RESET_TOKEN_TTL_SECONDS", None),
                ("HORIZON_FRONTEND_BASE_URL", None),
            ],
            || {
                let matches = matches_for(vec![
                    "horizon",
                    "--dsn",
                    "postgres://localhost/horizon",
                    "--signing-secret",
                    "a-test-secret-at-least-32-bytes-long!!",
                ]);
                let options = Options::parse(&matches).expect("options");
                assert_eq!(options.token_ttl_seconds, 18_000);
                assert_eq!(options.setup_token_ttl_seconds, 604_800);
                assert_eq!(options.reset_token_ttl_seconds, 3_600);
                assert_eq!(options.frontend_base_url, "http://localhost:3000");
            },
        );
    }

    #[test]
    fn setup_ttl_cap_enforced() {
        temp_env::with_vars([("HORIZON_SETUP_TOKEN_TTL_SECONDS", None::<&str>)], || {
            let matches = matches_for(vec![
                "horizon",
                "--dsn",
                "postgres://localhost/horizon",
                "--signing-secret",
                "a-test-secret-at-least-32-bytes-long!!",
                "--setup-token-ttl-seconds",
                "700000",
            ]);
            assert!(Options::parse(&matches).is_err());
        });
    }
}
