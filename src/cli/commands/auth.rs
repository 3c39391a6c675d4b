use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

/// Parsed auth/session options.
#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub refresh_pepper: SecretString,
    pub jwt_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub replay_grace_seconds: u64,
    pub replay_lookup_attempts: u32,
    pub replay_lookup_backoff_ms: u64,
    pub rate_limit_per_ip: u64,
    pub rate_limit_per_value: u64,
    pub rate_limit_window_seconds: u64,
}

impl Options {
    /// Extract auth options from validated CLI matches.
    ///
    /// # Errors
    /// Returns an error if a required secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .unwrap_or_else(|| "https://renovigo.dev".to_string()),
            refresh_pepper: matches
                .get_one::<String>("refresh-pepper")
                .cloned()
                .map(SecretString::from)
                .context("missing required argument: --refresh-pepper")?,
            jwt_secret: matches
                .get_one::<String>("jwt-secret")
                .cloned()
                .map(SecretString::from)
                .context("missing required argument: --jwt-secret")?,
            access_ttl_seconds: matches
                .get_one::<i64>("access-ttl-seconds")
                .copied()
                .unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>("refresh-ttl-seconds")
                .copied()
                .unwrap_or(1_209_600),
            replay_grace_seconds: matches
                .get_one::<u64>("replay-grace-seconds")
                .copied()
                .unwrap_or(30),
            replay_lookup_attempts: matches
                .get_one::<u32>("replay-lookup-attempts")
                .copied()
                .unwrap_or(3),
            replay_lookup_backoff_ms: matches
                .get_one::<u64>("replay-lookup-backoff-ms")
                .copied()
                .unwrap_or(150),
            rate_limit_per_ip: matches
                .get_one::<u64>("rate-limit-per-ip")
                .copied()
                .unwrap_or(20),
            rate_limit_per_value: matches
                .get_one::<u64>("rate-limit-per-value")
                .copied()
                .unwrap_or(10),
            rate_limit_window_seconds: matches
                .get_one::<u64>("rate-limit-window-seconds")
                .copied()
                .unwrap_or(900),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    let command = with_token_args(command);
    let command = with_replay_args(command);
    with_rate_limit_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL; drives CORS and the Secure cookie flag")
                .env("RENOVIGO_FRONTEND_BASE_URL")
                .default_value("https://renovigo.dev"),
        )
        .arg(
            Arg::new("refresh-pepper")
                .long("refresh-pepper")
                .help("Server-side key for hashing refresh-token secrets")
                .env("RENOVIGO_REFRESH_PEPPER")
                .required(true),
        )
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("HMAC key for signing access tokens")
                .env("RENOVIGO_JWT_SECRET")
                .required(true),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("RENOVIGO_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh session TTL in seconds")
                .env("RENOVIGO_REFRESH_TTL_SECONDS")
                .default_value("1209600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_replay_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("replay-grace-seconds")
                .long("replay-grace-seconds")
                .help("TTL for the rotation replay cache; duplicate refreshes inside this window resolve idempotently")
                .env("RENOVIGO_REPLAY_GRACE_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("replay-lookup-attempts")
                .long("replay-lookup-attempts")
                .help("Replay cache poll attempts before declaring a reuse genuine")
                .env("RENOVIGO_REPLAY_LOOKUP_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("replay-lookup-backoff-ms")
                .long("replay-lookup-backoff-ms")
                .help("Linear backoff step between replay cache polls")
                .env("RENOVIGO_REPLAY_LOOKUP_BACKOFF_MS")
                .default_value("150")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("rate-limit-per-ip")
                .long("rate-limit-per-ip")
                .help("Requests allowed per client IP within the window")
                .env("RENOVIGO_RATE_LIMIT_PER_IP")
                .default_value("20")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("rate-limit-per-value")
                .long("rate-limit-per-value")
                .help("Requests allowed per identifying value (email) within the window")
                .env("RENOVIGO_RATE_LIMIT_PER_VALUE")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("rate-limit-window-seconds")
                .long("rate-limit-window-seconds")
                .help("Sliding window length for rate limiting")
                .env("RENOVIGO_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
}
