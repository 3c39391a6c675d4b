//! Engine-level tests for rotation, replay recovery, and theft response.

use super::error::AuthError;
use super::hasher::split_token;
use super::rotation::{RotationEngine, SessionMeta};
use super::sessions::{Session, SessionStore};
use super::state::AuthConfig;
use super::test_support::{auth_config, MemoryReplayCache, MemorySessionStore};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn engine_with(
    config: &AuthConfig,
) -> (
    Arc<RotationEngine>,
    Arc<MemorySessionStore>,
    Arc<MemoryReplayCache>,
) {
    let store = Arc::new(MemorySessionStore::new());
    let replay = Arc::new(MemoryReplayCache::new());
    let engine = Arc::new(RotationEngine::new(config, store.clone(), replay.clone()));
    (engine, store, replay)
}

async fn session_for(store: &MemorySessionStore, token: &str) -> Result<Session> {
    let (jti, _) = split_token(token).context("token should parse")?;
    store
        .get_by_jti(jti)
        .await?
        .context("session row should exist")
}

#[tokio::test]
async fn login_starts_distinct_families() -> Result<()> {
    let config = auth_config();
    let (engine, store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let first = engine.login(user_id, SessionMeta::default()).await?;
    let second = engine.login(user_id, SessionMeta::default()).await?;

    let first_row = session_for(&store, &first.refresh_token).await?;
    let second_row = session_for(&store, &second.refresh_token).await?;
    assert_ne!(first_row.family_id, second_row.family_id);
    assert_eq!(first_row.user_id, user_id);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_links_chain() -> Result<()> {
    let config = auth_config();
    let (engine, store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;
    let rotated = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await?;
    let rotated_again = engine
        .refresh(&rotated.refresh_token, SessionMeta::default())
        .await?;

    let s0 = session_for(&store, &issued.refresh_token).await?;
    let s1 = session_for(&store, &rotated.refresh_token).await?;
    let s2 = session_for(&store, &rotated_again.refresh_token).await?;

    assert_eq!(s0.family_id, s1.family_id);
    assert_eq!(s1.family_id, s2.family_id);
    assert_eq!(s0.replaced_by_id, Some(s1.id));
    assert_eq!(s1.replaced_by_id, Some(s2.id));
    assert!(s0.revoked_at.is_some());
    assert!(s1.revoked_at.is_some());
    assert!(s2.revoked_at.is_none());
    assert_eq!(s2.replaced_by_id, None);

    // Chain integrity: following forward pointers never revisits a row and
    // ends at the row without a successor.
    let rows = store.family_rows(s0.family_id).await;
    let mut visited = HashSet::new();
    let mut current = Some(s0.id);
    let mut terminal = None;
    while let Some(id) = current {
        assert!(visited.insert(id), "chain revisited a row");
        let row = rows.iter().find(|row| row.id == id).context("row in family")?;
        terminal = Some(row.id);
        current = row.replaced_by_id;
    }
    assert_eq!(terminal, Some(s2.id));
    assert_eq!(store.active_rows(s0.family_id).await, 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_refresh_within_grace_is_idempotent() -> Result<()> {
    let config = auth_config();
    let (engine, store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;
    let first = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await?;
    // Same old token again, inside the grace window: same successor, no
    // new row, no theft response.
    let second = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await?;

    assert_eq!(first.refresh_token, second.refresh_token);
    assert_eq!(first.refresh_expires_at, second.refresh_expires_at);

    let family = session_for(&store, &issued.refresh_token).await?.family_id;
    assert_eq!(store.family_rows(family).await.len(), 2);
    assert_eq!(store.active_rows(family).await, 1);
    Ok(())
}

#[tokio::test]
async fn replay_outside_grace_revokes_family() -> Result<()> {
    // Grace window disabled: every reuse is treated as theft.
    let config = auth_config()
        .with_replay_grace_seconds(0)
        .with_replay_lookup_attempts(1)
        .with_replay_lookup_backoff_ms(0);
    let (engine, store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;
    let rotated = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await?;

    let replayed = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await;
    assert!(matches!(replayed, Err(AuthError::TokenRevoked)));

    // Theft containment: every row in the family is revoked, including the
    // legitimately rotated newest token.
    let family = session_for(&store, &issued.refresh_token).await?.family_id;
    assert_eq!(store.active_rows(family).await, 0);

    let newest = engine
        .refresh(&rotated.refresh_token, SessionMeta::default())
        .await;
    assert!(matches!(newest, Err(AuthError::TokenRevoked)));
    Ok(())
}

#[tokio::test]
async fn expired_sessions_always_reject() -> Result<()> {
    let config = auth_config().with_refresh_ttl_seconds(-10);
    let (engine, _store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;
    let result = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await;
    assert!(matches!(result, Err(AuthError::TokenExpired)));

    // Expiry wins regardless of revocation state.
    engine.logout(&issued.refresh_token).await?;
    let result = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await;
    assert!(matches!(result, Err(AuthError::TokenExpired)));
    Ok(())
}

#[tokio::test]
async fn malformed_unknown_and_tampered_tokens_are_invalid() -> Result<()> {
    let config = auth_config();
    let (engine, _store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;

    for presented in ["garbage", "trailing-dot.", ".leading-dot", ""] {
        let result = engine.refresh(presented, SessionMeta::default()).await;
        assert!(
            matches!(result, Err(AuthError::TokenInvalid)),
            "{presented:?} should be invalid"
        );
    }

    // Unknown jti and wrong secret are rejected identically.
    let unknown = format!("{}.someSecret", Uuid::new_v4());
    let result = engine.refresh(&unknown, SessionMeta::default()).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));

    let (jti, _) = split_token(&issued.refresh_token).context("token should parse")?;
    let tampered = format!("{jti}.wrong-secret");
    let result = engine.refresh(&tampered, SessionMeta::default()).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));
    Ok(())
}

#[tokio::test]
async fn logout_revokes_single_session_and_blocks_reuse() -> Result<()> {
    let config = auth_config();
    let (engine, store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;
    let rotated = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await?;

    engine.logout(&rotated.refresh_token).await?;
    let row = session_for(&store, &rotated.refresh_token).await?;
    assert!(row.revoked_at.is_some());
    assert_eq!(row.replaced_by_id, None);

    // Logout tolerates malformed and repeated input.
    engine.logout("not-a-token").await?;
    engine.logout(&rotated.refresh_token).await?;

    // Reusing the logged-out token is dead-credential reuse.
    let reused = engine
        .refresh(&rotated.refresh_token, SessionMeta::default())
        .await;
    assert!(matches!(reused, Err(AuthError::TokenRevoked)));
    assert_eq!(store.active_rows(row.family_id).await, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_yield_single_successor() -> Result<()> {
    // Generous polling so the losing request can observe the winner's
    // cache write.
    let config = auth_config()
        .with_replay_lookup_attempts(5)
        .with_replay_lookup_backoff_ms(20);
    let (engine, store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;
    let family = session_for(&store, &issued.refresh_token).await?.family_id;

    let first = {
        let engine = engine.clone();
        let token = issued.refresh_token.clone();
        tokio::spawn(async move { engine.refresh(&token, SessionMeta::default()).await })
    };
    let second = {
        let engine = engine.clone();
        let token = issued.refresh_token.clone();
        tokio::spawn(async move { engine.refresh(&token, SessionMeta::default()).await })
    };

    let first = first.await.context("join first")?;
    let second = second.await.context("join second")?;

    let successes: Vec<_> = [&first, &second]
        .into_iter()
        .filter_map(|result| result.as_ref().ok())
        .collect();
    assert!(!successes.is_empty(), "one refresh must succeed");

    // Exactly one successor row was ever created; the other call either
    // replay-recovered the identical pair or failed, never minted a second.
    let rows = store.family_rows(family).await;
    assert_eq!(rows.len(), 2);
    if successes.len() == 2 {
        assert_eq!(successes[0].refresh_token, successes[1].refresh_token);
        assert_eq!(store.active_rows(family).await, 1);
    }
    Ok(())
}

#[tokio::test]
async fn recovery_rejects_cache_that_contradicts_the_store() -> Result<()> {
    let config = auth_config();
    let (engine, store, _replay) = engine_with(&config);
    let user_id = Uuid::new_v4();

    let issued = engine.login(user_id, SessionMeta::default()).await?;
    let rotated = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await?;

    // The cached successor is revoked out from under the cache; recovery
    // must re-verify against the store and fall back to the theft path.
    let (new_jti, _) = split_token(&rotated.refresh_token).context("token should parse")?;
    store.revoke(new_jti).await?;

    let result = engine
        .refresh(&issued.refresh_token, SessionMeta::default())
        .await;
    assert!(matches!(result, Err(AuthError::TokenRevoked)));

    let family = session_for(&store, &issued.refresh_token).await?.family_id;
    assert_eq!(store.active_rows(family).await, 0);
    Ok(())
}
