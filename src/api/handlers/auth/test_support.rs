//! In-memory store and cache used by engine tests.
//!
//! `MemorySessionStore` holds one mutex across the whole rotate sequence,
//! mirroring the row-lock serialization the Postgres store gets from
//! `SELECT ... FOR UPDATE`.

use super::replay::ReplayCache;
use super::sessions::{NewSession, RotationOutcome, Session, SessionStore};
use super::state::AuthConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

pub(crate) fn auth_config() -> AuthConfig {
    AuthConfig::new(
        "https://renovigo.dev".to_string(),
        SecretString::from("pepper"),
        SecretString::from("jwt-secret"),
    )
}

#[derive(Default)]
pub(crate) struct MemorySessionStore {
    rows: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn build(new: &NewSession) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            jti: new.jti.clone(),
            family_id: new.family_id,
            refresh_token_hash: new.refresh_token_hash.clone(),
            issued_at: now,
            expires_at: now + ChronoDuration::seconds(new.ttl_seconds),
            revoked_at: None,
            replaced_by_id: None,
            user_agent: new.user_agent.clone(),
            ip_address: new.ip_address.clone(),
        }
    }

    pub(crate) async fn family_rows(&self, family_id: Uuid) -> Vec<Session> {
        self.rows
            .lock()
            .await
            .values()
            .filter(|session| session.family_id == family_id)
            .cloned()
            .collect()
    }

    pub(crate) async fn active_rows(&self, family_id: Uuid) -> usize {
        self.family_rows(family_id)
            .await
            .iter()
            .filter(|session| session.revoked_at.is_none())
            .count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, new: NewSession) -> Result<Session> {
        let session = Self::build(&new);
        self.rows
            .lock()
            .await
            .insert(session.jti.clone(), session.clone());
        Ok(session)
    }

    async fn get_by_jti(&self, jti: &str) -> Result<Option<Session>> {
        Ok(self.rows.lock().await.get(jti).cloned())
    }

    async fn rotate(&self, old_jti: &str, replacement: NewSession) -> Result<RotationOutcome> {
        // One guard across re-check, insert, and link: the row lock.
        let mut rows = self.rows.lock().await;
        let current = rows
            .get(old_jti)
            .cloned()
            .ok_or_else(|| anyhow!("session row vanished during rotation: {old_jti}"))?;

        if current.revoked_at.is_some() {
            return Ok(if current.replaced_by_id.is_some() {
                RotationOutcome::AlreadyRotated
            } else {
                RotationOutcome::Revoked
            });
        }
        let now = Utc::now();
        if current.expires_at <= now {
            return Ok(RotationOutcome::Expired);
        }

        let successor = Self::build(&replacement);
        rows.insert(successor.jti.clone(), successor.clone());
        if let Some(old) = rows.get_mut(old_jti) {
            old.revoked_at = Some(now);
            old.replaced_by_id = Some(successor.id);
        }
        Ok(RotationOutcome::Rotated(successor))
    }

    async fn revoke(&self, jti: &str) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(jti) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(Utc::now());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();
        let mut revoked = 0;
        for session in rows.values_mut() {
            if session.family_id == family_id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[derive(Default)]
pub(crate) struct MemoryReplayCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryReplayCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayCache for MemoryReplayCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
