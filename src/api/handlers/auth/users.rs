//! Database helpers for user accounts.

use super::utils::is_unique_violation;
use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(Uuid),
    Conflict,
}

/// Minimal fields needed for login and identity lookups.
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) password_hash: String,
    pub(super) is_active: bool,
}

pub(super) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, password_hash, is_active FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
    }))
}

pub(super) async fn lookup_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, password_hash, is_active FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
    }))
}

pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    name: Option<&str>,
) -> Result<SignupOutcome> {
    let query = r"
        INSERT INTO users (email, password_hash, name)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}
