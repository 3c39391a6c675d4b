use crate::api::{
    self,
    handlers::auth::{AuthConfig, RateLimitSettings},
};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: String,
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

/// Execute the server action.
/// # Errors
/// Returns an error if the database or cache connection fails, or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(
        args.frontend_base_url,
        args.refresh_pepper,
        args.jwt_secret,
    )
    .with_access_ttl_seconds(args.access_ttl_seconds)
    .with_refresh_ttl_seconds(args.refresh_ttl_seconds)
    .with_replay_grace_seconds(args.replay_grace_seconds)
    .with_replay_lookup_attempts(args.replay_lookup_attempts)
    .with_replay_lookup_backoff_ms(args.replay_lookup_backoff_ms);

    let rate_limits = RateLimitSettings {
        per_ip: args.rate_limit_per_ip,
        per_value: args.rate_limit_per_value,
        window_seconds: args.rate_limit_window_seconds,
    };

    api::new(args.port, args.dsn, args.redis_url, auth_config, rate_limits).await
}
