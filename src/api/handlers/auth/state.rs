//! Auth configuration and shared request state.

use super::{rate_limit::RateLimiter, replay::ReplayCache, rotation::RotationEngine};
use secrecy::SecretString;
use std::sync::Arc;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 14 * 24 * 60 * 60;
const DEFAULT_REPLAY_GRACE_SECONDS: u64 = 30;
const DEFAULT_REPLAY_LOOKUP_ATTEMPTS: u32 = 3;
const DEFAULT_REPLAY_LOOKUP_BACKOFF_MS: u64 = 150;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    refresh_pepper: SecretString,
    jwt_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    replay_grace_seconds: u64,
    replay_lookup_attempts: u32,
    replay_lookup_backoff_ms: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        frontend_base_url: String,
        refresh_pepper: SecretString,
        jwt_secret: SecretString,
    ) -> Self {
        Self {
            frontend_base_url,
            refresh_pepper,
            jwt_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            replay_grace_seconds: DEFAULT_REPLAY_GRACE_SECONDS,
            replay_lookup_attempts: DEFAULT_REPLAY_LOOKUP_ATTEMPTS,
            replay_lookup_backoff_ms: DEFAULT_REPLAY_LOOKUP_BACKOFF_MS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_replay_grace_seconds(mut self, seconds: u64) -> Self {
        self.replay_grace_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_replay_lookup_attempts(mut self, attempts: u32) -> Self {
        self.replay_lookup_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_replay_lookup_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.replay_lookup_backoff_ms = backoff_ms;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn refresh_pepper(&self) -> &SecretString {
        &self.refresh_pepper
    }

    pub(crate) fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    pub(crate) fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub(crate) fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    pub(crate) fn replay_grace_seconds(&self) -> u64 {
        self.replay_grace_seconds
    }

    pub(crate) fn replay_lookup_attempts(&self) -> u32 {
        self.replay_lookup_attempts
    }

    pub(crate) fn replay_lookup_backoff_ms(&self) -> u64 {
        self.replay_lookup_backoff_ms
    }

    /// Cookies are only marked `Secure` when the frontend is on HTTPS.
    pub(crate) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    engine: RotationEngine,
    rate_limiter: Arc<dyn RateLimiter>,
    replay: Arc<dyn ReplayCache>,
}

impl AuthState {
    pub(crate) fn new(
        config: AuthConfig,
        engine: RotationEngine,
        rate_limiter: Arc<dyn RateLimiter>,
        replay: Arc<dyn ReplayCache>,
    ) -> Self {
        Self {
            config,
            engine,
            rate_limiter,
            replay,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn engine(&self) -> &RotationEngine {
        &self.engine
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn replay(&self) -> &dyn ReplayCache {
        self.replay.as_ref()
    }
}
