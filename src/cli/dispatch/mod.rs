//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        signing_secret: auth_opts.signing_secret,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        setup_token_ttl_seconds: auth_opts.setup_token_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        frontend_base_url: auth_opts.frontend_base_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_required() {
        temp_env::with_vars(
            [
                ("HORIZON_DSN", None::<&str>),
                (
                    "HORIZON_SIGNING_SECRET",
                    Some("a-test-secret-at-least-32-bytes-long!!"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                // dsn is required=true, so parsing without it fails at clap level.
                let result = command.try_get_matches_from(vec!["horizon"]);
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn server_action_built_from_args() {
        temp_env::with_vars(
            [
                ("HORIZON_DSN", None::<&str>),
                ("HORIZON_SIGNING_SECRET", None),
                ("HORIZON_PORT", None),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "horizon",
                    "--dsn",
                    "postgres://localhost/horizon",
                    "--signing-secret",
                    "a-test-secret-at-least-32-bytes-long!!",
                    "--port",
                    "9090",
                ]);
                let action = handler(&matches).expect("action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 9090);
                assert_eq!(args.dsn, "postgres://localhost/horizon");
                assert_eq!(args.token_ttl_seconds, 18_000);
            },
        );
    }
}
