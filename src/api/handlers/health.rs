use super::auth::AuthState;
use crate::api::GIT_COMMIT_HASH;
use axum::{
    extract::Extension,
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use std::sync::Arc;
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    cache: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Database and replay cache are healthy", body = [Health]),
        (status = 503, description = "Database or replay cache is unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(
    method: Method,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let database = match pool.0.acquire().instrument(acquire_span).await {
        Ok(mut conn) => {
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            match conn.ping().instrument(ping_span).await {
                Ok(()) => Ok(()),
                Err(error) => {
                    error!("Failed to ping database: {}", error);

                    Err(StatusCode::SERVICE_UNAVAILABLE)
                }
            }
        }

        Err(error) => {
            error!("Failed to acquire database connection: {}", error);

            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    // The cache is best-effort for rotation but still reported here so
    // operators see degraded replay tolerance.
    let cache = match auth_state.0.replay().ping().await {
        Ok(()) => Ok(()),
        Err(error) => {
            error!("Failed to ping replay cache: {}", error);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    let is_healthy = database.is_ok() && cache.is_ok();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
        cache: if cache.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
    };

    let status = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    // Preflight and HEAD-style probes only need the status line.
    if method == Method::GET {
        (status, Json(health)).into_response()
    } else {
        status.into_response()
    }
}
