//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

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
    let redis_url = matches
        .get_one::<String>("redis-url")
        .cloned()
        .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        redis_url,
        frontend_base_url: auth_opts.frontend_base_url,
        refresh_pepper: auth_opts.refresh_pepper,
        jwt_secret: auth_opts.jwt_secret,
        access_ttl_seconds: auth_opts.access_ttl_seconds,
        refresh_ttl_seconds: auth_opts.refresh_ttl_seconds,
        replay_grace_seconds: auth_opts.replay_grace_seconds,
        replay_lookup_attempts: auth_opts.replay_lookup_attempts,
        replay_lookup_backoff_ms: auth_opts.replay_lookup_backoff_ms,
        rate_limit_per_ip: auth_opts.rate_limit_per_ip,
        rate_limit_per_value: auth_opts.rate_limit_per_value,
        rate_limit_window_seconds: auth_opts.rate_limit_window_seconds,
    }))
}
