//! Refresh endpoint: advance the session family or detect replay.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use super::{
    error::AuthError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    rotation::SessionMeta,
    session::{extract_refresh_token, refresh_cookie},
    state::AuthState,
    types::TokenResponse,
    utils::{extract_client_ip, extract_user_agent},
};
use crate::api::response::ok;

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New access token; refresh cookie rotated", body = TokenResponse),
        (status = 401, description = "Invalid, expired, or revoked refresh token", body = crate::api::response::Envelope),
        (status = 429, description = "Rate limited", body = crate::api::response::Envelope)
    ),
    tag = "auth"
)]
pub async fn refresh(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    // No request body; the refresh token rides the HttpOnly cookie.
    let Some(presented) = extract_refresh_token(&headers) else {
        return AuthError::Unauthenticated.into_response();
    };

    let client_ip = extract_client_ip(&headers);
    if let RateLimitDecision::Limited {
        retry_after_seconds,
    } = auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Refresh)
        .await
    {
        return AuthError::RateLimited {
            retry_after_seconds,
        }
        .into_response();
    }

    let meta = SessionMeta {
        user_agent: extract_user_agent(&headers),
        ip_address: client_ip,
    };
    let tokens = match auth_state.engine().refresh(&presented, meta).await {
        Ok(tokens) => tokens,
        Err(err) => return err.into_response(),
    };

    let mut response = ok(TokenResponse::bearer(tokens.access_token)).into_response();
    match refresh_cookie(
        auth_state.config(),
        &tokens.refresh_token,
        tokens.refresh_expires_at,
    ) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
            response
        }
        Err(err) => {
            error!("Failed to rotate refresh cookie: {err}");
            AuthError::Internal(err.into()).into_response()
        }
    }
}
