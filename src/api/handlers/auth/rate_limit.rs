//! Sliding-window rate limiting for credential endpoints.
//!
//! Counters live in Redis sorted sets keyed per scope and per IP or
//! identifying value; each check prunes the window, counts, and records
//! only accepted requests. Throttling is advisory (429 + `Retry-After`),
//! not a security boundary, so cache failures fail open.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::warn;

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    Register,
    Login,
    Refresh,
}

impl RateLimitAction {
    const fn scope(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

/// Window tuning shared by all scopes.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitSettings {
    pub per_ip: u64,
    pub per_value: u64,
    pub window_seconds: u64,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    async fn check_value(&self, value: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    async fn check_value(&self, _value: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

pub struct RedisRateLimiter {
    conn: ConnectionManager,
    settings: RateLimitSettings,
}

impl RedisRateLimiter {
    #[must_use]
    pub fn new(conn: ConnectionManager, settings: RateLimitSettings) -> Self {
        Self { conn, settings }
    }

    async fn check(&self, key: String, limit: u64) -> RateLimitDecision {
        match self.try_check(&key, limit).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!("rate limiter unavailable, failing open: {err:#}");
                RateLimitDecision::Allowed
            }
        }
    }

    async fn try_check(&self, key: &str, limit: u64) -> Result<RateLimitDecision> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(self.settings.window_seconds)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);

        // Phase 1: trim + count; no side effects if we later reject.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(0)
            .arg(now_ms - window_ms)
            .ignore()
            .cmd("ZCARD")
            .arg(key);
        let (count,): (u64,) = pipe
            .query_async(&mut conn)
            .await
            .context("failed to count rate-limit window")?;

        if count >= limit {
            // Compute the real retry hint from the oldest in-window member.
            let oldest: Vec<(String, i64)> = redis::cmd("ZRANGE")
                .arg(key)
                .arg(0)
                .arg(0)
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await
                .context("failed to read oldest rate-limit member")?;
            let oldest_ms = oldest.first().map_or(now_ms, |(_, score)| *score);
            return Ok(RateLimitDecision::Limited {
                retry_after_seconds: retry_after_seconds(oldest_ms, window_ms, now_ms),
            });
        }

        // Phase 2: record + housekeeping, only for accepted requests.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZADD")
            .arg(key)
            .arg(now_ms)
            .arg(now_ms)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(window_ms)
            .ignore();
        let () = pipe
            .query_async(&mut conn)
            .await
            .context("failed to record rate-limit hit")?;

        Ok(RateLimitDecision::Allowed)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        let ip = ip.unwrap_or("unknown");
        let key = format!("rl:{}:ip:{ip}", action.scope());
        self.check(key, self.settings.per_ip).await
    }

    async fn check_value(&self, value: &str, action: RateLimitAction) -> RateLimitDecision {
        let key = format!("rl:{}:key:{value}", action.scope());
        self.check(key, self.settings.per_value).await
    }
}

/// Seconds until the oldest in-window member ages out; never less than 1.
fn retry_after_seconds(oldest_ms: i64, window_ms: i64, now_ms: i64) -> u64 {
    let retry_ms = oldest_ms + window_ms - now_ms;
    let seconds = (retry_ms + 999) / 1000;
    u64::try_from(seconds.max(1)).unwrap_or(1)
}
