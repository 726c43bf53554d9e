use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Map a level name (or raw count) from `HORIZON_LOG_LEVEL` to a verbosity count.
fn parse_log_level(level: &str) -> Result<u8, String> {
    match level.to_ascii_lowercase().as_str() {
        "error" => Ok(0),
        "warn" => Ok(1),
        "info" => Ok(2),
        "debug" => Ok(3),
        "trace" => Ok(4),
        other => other
            .parse::<u8>()
            .map_err(|_| format!("invalid log level: {other}")),
    }
}

pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity: -v (warn), -vv (info), -vvv (debug), -vvvv (trace)")
            .env("HORIZON_LOG_LEVEL")
            .action(ArgAction::Count)
            .value_parser(ValueParser::new(parse_log_level)),
    )
}

#[cfg(test)]
mod tests {
    use super::parse_log_level;

    #[test]
    fn level_names_map_to_counts() {
        assert_eq!(parse_log_level("error"), Ok(0));
        assert_eq!(parse_log_level("WARN"), Ok(1));
        assert_eq!(parse_log_level("info"), Ok(2));
        assert_eq!(parse_log_level("debug"), Ok(3));
        assert_eq!(parse_log_level("trace"), Ok(4));
    }

    #[test]
    fn raw_counts_pass_through() {
        assert_eq!(parse_log_level("3"), Ok(3));
        assert!(parse_log_level("verbose").is_err());
    }
}
