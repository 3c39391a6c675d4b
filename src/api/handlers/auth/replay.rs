//! Short-TTL replay cache for just-completed rotations.
//!
//! Two entries per rotation: the old `jti` maps to its successor's `jti`,
//! and the successor's `jti` maps to the issued plaintext and expiry. Both
//! expire after the grace window. The cache only answers "did I, moments
//! ago, already rotate this exact token?" — the database row stays
//! authoritative, and a miss falls back to the theft response.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub(crate) fn rotated_key(jti: &str) -> String {
    format!("refresh:rotated:{jti}")
}

pub(crate) fn issued_key(jti: &str) -> String {
    format!("refresh:issued:{jti}")
}

/// Typed cache payload for an issued successor; a loose map here would let
/// writer and reader drift apart silently.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CachedRotation {
    pub(crate) refresh_token: String,
    pub(crate) expires_at: DateTime<Utc>,
}

#[async_trait]
pub(crate) trait ReplayCache: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn ping(&self) -> Result<()>;
}

pub(crate) struct RedisReplayCache {
    conn: ConnectionManager,
}

impl RedisReplayCache {
    pub(crate) fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ReplayCache for RedisReplayCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let seconds = ttl.as_secs();
        if seconds == 0 {
            // A zero grace window disables the cache entirely.
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await
            .context("failed to write replay cache entry")?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .context("failed to read replay cache entry")?;
        Ok(value)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("failed to ping replay cache")?;
        Ok(())
    }
}
