//! Durable refresh-session storage.
//!
//! One row per refresh-token generation, keyed by `jti` and grouped by
//! `family_id`. Rows are never deleted here; rotation and revocation only
//! set `revoked_at` / `replaced_by_id`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

/// One refresh-token generation.
#[derive(Clone, Debug)]
pub(crate) struct Session {
    pub(crate) id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) jti: String,
    pub(crate) family_id: Uuid,
    pub(crate) refresh_token_hash: String,
    pub(crate) issued_at: DateTime<Utc>,
    pub(crate) expires_at: DateTime<Utc>,
    pub(crate) revoked_at: Option<DateTime<Utc>>,
    pub(crate) replaced_by_id: Option<Uuid>,
    pub(crate) user_agent: Option<String>,
    pub(crate) ip_address: Option<String>,
}

/// Fields for a row about to be created (at login or rotation).
#[derive(Clone, Debug)]
pub(crate) struct NewSession {
    pub(crate) user_id: Uuid,
    pub(crate) jti: String,
    pub(crate) family_id: Uuid,
    pub(crate) refresh_token_hash: String,
    pub(crate) ttl_seconds: i64,
    pub(crate) user_agent: Option<String>,
    pub(crate) ip_address: Option<String>,
}

/// What the store observed under the row lock when asked to rotate.
#[derive(Debug)]
pub(crate) enum RotationOutcome {
    /// The successor row; the old row is now revoked and forward-linked.
    Rotated(Session),
    /// A concurrent request rotated this row first.
    AlreadyRotated,
    /// The row was revoked without a successor (logout or theft response).
    Revoked,
    /// The row expired between the caller's check and the lock.
    Expired,
}

#[async_trait]
pub(crate) trait SessionStore: Send + Sync {
    async fn create(&self, new: NewSession) -> Result<Session>;
    async fn get_by_jti(&self, jti: &str) -> Result<Option<Session>>;
    /// Atomically: lock the old row, re-check its state, insert the
    /// replacement, and forward-link the old row. Serialized per `jti` so
    /// two concurrent refreshes of the same token cannot both mint a
    /// successor.
    async fn rotate(&self, old_jti: &str, replacement: NewSession) -> Result<RotationOutcome>;
    /// Idempotent; revoking an already-revoked row is a no-op.
    async fn revoke(&self, jti: &str) -> Result<u64>;
    /// Idempotent set-based theft response over the whole family.
    async fn revoke_family(&self, family_id: Uuid) -> Result<u64>;
}

pub(crate) struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_session(
        tx: &mut Transaction<'_, Postgres>,
        new: &NewSession,
    ) -> Result<Session> {
        let query = r"
            INSERT INTO user_sessions
                (user_id, jti, family_id, refresh_token_hash, issued_at, expires_at, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, NOW(), NOW() + ($5 * INTERVAL '1 second'), $6, $7)
            RETURNING id, issued_at, expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(new.user_id)
            .bind(&new.jti)
            .bind(new.family_id)
            .bind(&new.refresh_token_hash)
            .bind(new.ttl_seconds)
            .bind(&new.user_agent)
            .bind(&new.ip_address)
            .fetch_one(&mut **tx)
            .instrument(span)
            .await
            .context("failed to insert session")?;

        Ok(Session {
            id: row.get("id"),
            user_id: new.user_id,
            jti: new.jti.clone(),
            family_id: new.family_id,
            refresh_token_hash: new.refresh_token_hash.clone(),
            issued_at: row.get("issued_at"),
            expires_at: row.get("expires_at"),
            revoked_at: None,
            replaced_by_id: None,
            user_agent: new.user_agent.clone(),
            ip_address: new.ip_address.clone(),
        })
    }

    /// Lock the row for the duration of the transaction; concurrent
    /// lockers of the same `jti` block here.
    async fn lock_by_jti(
        tx: &mut Transaction<'_, Postgres>,
        jti: &str,
    ) -> Result<Option<Session>> {
        let query = "SELECT * FROM user_sessions WHERE jti = $1 FOR UPDATE";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_optional(&mut **tx)
            .instrument(span)
            .await
            .context("failed to lock session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    /// Mark the old row rotated: revoked and forward-linked to its successor.
    async fn link_rotation(
        tx: &mut Transaction<'_, Postgres>,
        old_jti: &str,
        new_session_id: Uuid,
    ) -> Result<()> {
        let query = r"
            UPDATE user_sessions
            SET revoked_at = NOW(), replaced_by_id = $2
            WHERE jti = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(old_jti)
            .bind(new_session_id)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to link rotation")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, new: NewSession) -> Result<Session> {
        let mut tx = self.pool.begin().await.context("begin create session")?;
        let session = Self::insert_session(&mut tx, &new).await?;
        tx.commit().await.context("commit create session")?;
        Ok(session)
    }

    async fn get_by_jti(&self, jti: &str) -> Result<Option<Session>> {
        let query = "SELECT * FROM user_sessions WHERE jti = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn rotate(&self, old_jti: &str, replacement: NewSession) -> Result<RotationOutcome> {
        let mut tx = self.pool.begin().await.context("begin rotation")?;

        let current = Self::lock_by_jti(&mut tx, old_jti)
            .await?
            .ok_or_else(|| anyhow!("session row vanished during rotation: {old_jti}"))?;

        // Re-check under the lock: another request may have won the race.
        if current.revoked_at.is_some() {
            return Ok(if current.replaced_by_id.is_some() {
                RotationOutcome::AlreadyRotated
            } else {
                RotationOutcome::Revoked
            });
        }
        if current.expires_at <= Utc::now() {
            return Ok(RotationOutcome::Expired);
        }

        let successor = Self::insert_session(&mut tx, &replacement).await?;
        Self::link_rotation(&mut tx, old_jti, successor.id).await?;
        tx.commit().await.context("commit rotation")?;

        Ok(RotationOutcome::Rotated(successor))
    }

    async fn revoke(&self, jti: &str) -> Result<u64> {
        let query = r"
            UPDATE user_sessions
            SET revoked_at = NOW()
            WHERE jti = $1 AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(jti)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected())
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE user_sessions
            SET revoked_at = NOW()
            WHERE family_id = $1 AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(family_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke session family")?;
        Ok(result.rows_affected())
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        jti: row.get("jti"),
        family_id: row.get("family_id"),
        refresh_token_hash: row.get("refresh_token_hash"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        replaced_by_id: row.get("replaced_by_id"),
        user_agent: row.get("user_agent"),
        ip_address: row.get("ip_address"),
    }
}
