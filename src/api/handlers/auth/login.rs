//! Login endpoint: verify credentials, start a session family.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    error::AuthError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    rotation::SessionMeta,
    session::refresh_cookie,
    state::AuthState,
    types::{LoginRequest, TokenResponse},
    users::lookup_user_by_email,
    utils::{extract_client_ip, extract_user_agent, normalize_email, valid_email},
};
use crate::api::response::{fail, ok, BizCode};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token issued; refresh cookie set", body = TokenResponse),
        (status = 401, description = "Unknown account or wrong password", body = crate::api::response::Envelope),
        (status = 422, description = "Validation error", body = crate::api::response::Envelope),
        (status = 429, description = "Rate limited", body = crate::api::response::Envelope)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, BizCode::InvalidRequest);
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return fail(StatusCode::UNPROCESSABLE_ENTITY, BizCode::ValidationError);
    }

    // Throttle before touching stored credentials.
    let client_ip = extract_client_ip(&headers);
    if let RateLimitDecision::Limited {
        retry_after_seconds,
    } = auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        .await
    {
        return AuthError::RateLimited {
            retry_after_seconds,
        }
        .into_response();
    }
    if let RateLimitDecision::Limited {
        retry_after_seconds,
    } = auth_state
        .rate_limiter()
        .check_value(&email, RateLimitAction::Login)
        .await
    {
        return AuthError::RateLimited {
            retry_after_seconds,
        }
        .into_response();
    }

    let user = match lookup_user_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => return AuthError::Internal(err).into_response(),
    };

    // Unknown accounts and wrong passwords are indistinguishable.
    let Some(user) = user else {
        return AuthError::Unauthenticated.into_response();
    };
    if !user.is_active || !bcrypt::verify(&request.password, &user.password_hash).unwrap_or(false) {
        return AuthError::Unauthenticated.into_response();
    }

    let meta = SessionMeta {
        user_agent: extract_user_agent(&headers),
        ip_address: client_ip,
    };
    let tokens = match auth_state.engine().login(user.id, meta).await {
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
            error!("Failed to set refresh cookie: {err}");
            AuthError::Internal(err.into()).into_response()
        }
    }
}
