//! The rotation engine: validate a presented refresh token, then rotate,
//! replay-recover, or reject.
//!
//! State machine per session row: Active → Rotated (revoked + forward
//! link) or Revoked-for-theft (revoked, no link); expiry is derived from
//! `expires_at` and always checked first. Reuse of a rotated token inside
//! the grace window resolves idempotently through the replay cache; outside
//! it, the whole family is revoked and the caller must re-authenticate.

use super::{
    error::AuthError,
    hasher::{split_token, CredentialHasher},
    replay::{issued_key, rotated_key, CachedRotation, ReplayCache},
    sessions::{NewSession, RotationOutcome, Session, SessionStore},
    state::AuthConfig,
    token::{AccessClaims, AccessTokenIssuer},
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

/// Diagnostic request metadata stored alongside each session row.
#[derive(Clone, Debug, Default)]
pub(crate) struct SessionMeta {
    pub(crate) user_agent: Option<String>,
    pub(crate) ip_address: Option<String>,
}

/// The pair handed back to the client after login, rotation, or recovery.
#[derive(Clone, Debug)]
pub(crate) struct IssuedTokens {
    pub(crate) access_token: String,
    pub(crate) refresh_token: String,
    pub(crate) refresh_expires_at: DateTime<Utc>,
    pub(crate) user_id: Uuid,
}

pub(crate) struct RotationEngine {
    hasher: CredentialHasher,
    tokens: AccessTokenIssuer,
    store: Arc<dyn SessionStore>,
    replay: Arc<dyn ReplayCache>,
    refresh_ttl_seconds: i64,
    replay_grace: Duration,
    replay_lookup_attempts: u32,
    replay_lookup_backoff: Duration,
}

impl RotationEngine {
    pub(crate) fn new(
        config: &AuthConfig,
        store: Arc<dyn SessionStore>,
        replay: Arc<dyn ReplayCache>,
    ) -> Self {
        Self {
            hasher: CredentialHasher::new(config.refresh_pepper().clone()),
            tokens: AccessTokenIssuer::new(config.jwt_secret().clone(), config.access_ttl_seconds()),
            store,
            replay,
            refresh_ttl_seconds: config.refresh_ttl_seconds(),
            replay_grace: Duration::from_secs(config.replay_grace_seconds()),
            replay_lookup_attempts: config.replay_lookup_attempts().max(1),
            replay_lookup_backoff: Duration::from_millis(config.replay_lookup_backoff_ms()),
        }
    }

    /// Start a new session family for a freshly authenticated user.
    pub(crate) async fn login(
        &self,
        user_id: Uuid,
        meta: SessionMeta,
    ) -> Result<IssuedTokens, AuthError> {
        let pair = self.hasher.new_refresh_pair()?;
        let session = self
            .store
            .create(NewSession {
                user_id,
                jti: pair.jti,
                family_id: Uuid::new_v4(),
                refresh_token_hash: pair.hash,
                ttl_seconds: self.refresh_ttl_seconds,
                user_agent: meta.user_agent,
                ip_address: meta.ip_address,
            })
            .await?;
        let access_token = self.tokens.issue(user_id)?;
        debug!(family_id = %session.family_id, "started refresh session family");
        Ok(IssuedTokens {
            access_token,
            refresh_token: pair.plaintext,
            refresh_expires_at: session.expires_at,
            user_id,
        })
    }

    /// Exchange a presented refresh token for a successor generation.
    pub(crate) async fn refresh(
        &self,
        presented: &str,
        meta: SessionMeta,
    ) -> Result<IssuedTokens, AuthError> {
        let Some((jti, _secret)) = split_token(presented) else {
            return Err(AuthError::TokenInvalid);
        };
        let Some(session) = self.store.get_by_jti(jti).await? else {
            return Err(AuthError::TokenInvalid);
        };
        // Unknown jti and wrong secret must be indistinguishable.
        if !self.hasher.verify(presented, &session.refresh_token_hash) {
            return Err(AuthError::TokenInvalid);
        }
        // Expiry is absolute, regardless of revocation state.
        if session.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        if session.revoked_at.is_none() {
            return self.rotate_active(&session, meta).await;
        }
        if session.replaced_by_id.is_some() {
            // A retry of an already-completed rotation, or a theft.
            return self.replay_recover(&session).await;
        }
        // Revoked without a successor: the token was individually revoked
        // (logout) or already burned by a theft response. Using it again is
        // reuse of a dead credential; converge the family to revoked.
        self.store.revoke_family(session.family_id).await?;
        Err(AuthError::TokenRevoked)
    }

    /// Revoke the single session named by the token. Malformed or unknown
    /// tokens are ignored; logout is idempotent.
    pub(crate) async fn logout(&self, presented: &str) -> Result<(), AuthError> {
        if let Some((jti, _secret)) = split_token(presented) {
            self.store.revoke(jti).await?;
        }
        Ok(())
    }

    /// Verify a bearer access token.
    pub(crate) fn access_claims(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.tokens.verify(token)
    }

    async fn rotate_active(
        &self,
        session: &Session,
        meta: SessionMeta,
    ) -> Result<IssuedTokens, AuthError> {
        let pair = self.hasher.new_refresh_pair()?;
        let replacement = NewSession {
            user_id: session.user_id,
            jti: pair.jti,
            family_id: session.family_id,
            refresh_token_hash: pair.hash,
            ttl_seconds: self.refresh_ttl_seconds,
            user_agent: meta.user_agent,
            ip_address: meta.ip_address,
        };

        match self.store.rotate(&session.jti, replacement).await? {
            RotationOutcome::Rotated(successor) => {
                self.cache_rotation(&session.jti, &successor, &pair.plaintext)
                    .await;
                let access_token = self.tokens.issue(session.user_id)?;
                debug!(family_id = %session.family_id, "rotated refresh session");
                Ok(IssuedTokens {
                    access_token,
                    refresh_token: pair.plaintext,
                    refresh_expires_at: successor.expires_at,
                    user_id: session.user_id,
                })
            }
            RotationOutcome::Expired => Err(AuthError::TokenExpired),
            // Lost the race against a concurrent refresh of the same token.
            RotationOutcome::AlreadyRotated => self.replay_recover(session).await,
            RotationOutcome::Revoked => {
                self.store.revoke_family(session.family_id).await?;
                Err(AuthError::TokenRevoked)
            }
        }
    }

    /// The presented token was already rotated. Either this is the same
    /// request resolving twice (grace window) or a different actor
    /// replaying a stale secret (theft).
    async fn replay_recover(&self, old: &Session) -> Result<IssuedTokens, AuthError> {
        if let Some(tokens) = self.lookup_recent_rotation(old).await? {
            debug!(family_id = %old.family_id, "replayed rotation recovered from grace cache");
            return Ok(tokens);
        }

        let revoked = self.store.revoke_family(old.family_id).await?;
        warn!(
            family_id = %old.family_id,
            revoked_rows = revoked,
            "refresh token replayed outside grace window; family revoked"
        );
        Err(AuthError::TokenRevoked)
    }

    /// Poll the replay cache for the successor of `old`, with bounded
    /// linear backoff covering a concurrent rotation that is still
    /// mid-flight between commit and cache write.
    async fn lookup_recent_rotation(
        &self,
        old: &Session,
    ) -> Result<Option<IssuedTokens>, AuthError> {
        let rotated = rotated_key(&old.jti);
        for attempt in 0..self.replay_lookup_attempts {
            if attempt > 0 {
                sleep(self.replay_lookup_backoff * attempt).await;
            }

            let new_jti = match self.replay.get(&rotated).await {
                Ok(value) => value,
                Err(err) => {
                    warn!("replay cache read failed, treating as miss: {err:#}");
                    None
                }
            };
            let Some(new_jti) = new_jti else {
                continue;
            };

            let issued = match self.replay.get(&issued_key(&new_jti)).await {
                Ok(value) => value,
                Err(err) => {
                    warn!("replay cache read failed, treating as miss: {err:#}");
                    None
                }
            };
            let Some(cached) =
                issued.and_then(|raw| serde_json::from_str::<CachedRotation>(&raw).ok())
            else {
                return Ok(None);
            };

            // The cache is not authoritative: independently re-verify the
            // successor row before replaying the response.
            let Some(successor) = self.store.get_by_jti(&new_jti).await? else {
                return Ok(None);
            };
            if successor.revoked_at.is_some()
                || successor.expires_at <= Utc::now()
                || !self
                    .hasher
                    .verify(&cached.refresh_token, &successor.refresh_token_hash)
            {
                return Ok(None);
            }

            let access_token = self.tokens.issue(successor.user_id)?;
            return Ok(Some(IssuedTokens {
                access_token,
                refresh_token: cached.refresh_token,
                refresh_expires_at: successor.expires_at,
                user_id: successor.user_id,
            }));
        }
        Ok(None)
    }

    /// Best-effort: a lost write only widens the theft false-positive rate
    /// under retry storms, never the durable state.
    async fn cache_rotation(&self, old_jti: &str, successor: &Session, refresh_token: &str) {
        if self.replay_grace.is_zero() {
            return;
        }
        let payload = CachedRotation {
            refresh_token: refresh_token.to_string(),
            expires_at: successor.expires_at,
        };
        let raw = match serde_json::to_string(&payload) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to serialize replay cache payload: {err}");
                return;
            }
        };
        // Write the payload before the old→new mapping so a reader that
        // finds the mapping always finds the payload.
        if let Err(err) = self
            .replay
            .put(&issued_key(&successor.jti), &raw, self.replay_grace)
            .await
        {
            warn!("failed to cache issued rotation: {err:#}");
            return;
        }
        if let Err(err) = self
            .replay
            .put(&rotated_key(old_jti), &successor.jti, self.replay_grace)
            .await
        {
            warn!("failed to cache rotation mapping: {err:#}");
        }
    }
}
