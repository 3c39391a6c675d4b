//! Refresh-cookie handling, logout, and the current-user endpoint.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::{
    error::AuthError,
    state::{AuthConfig, AuthState},
    types::MeResponse,
    users::lookup_user_by_id,
};
use crate::api::response::ok;

pub(super) const REFRESH_COOKIE_NAME: &str = "renovigo_refresh";
// Scoped so browsers only attach the refresh token to auth endpoints.
const REFRESH_COOKIE_PATH: &str = "/auth";

/// Build the `HttpOnly` refresh cookie; `Max-Age` tracks the session row's
/// `expires_at`.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}=; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age=0"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session revoked and cookie cleared", body = crate::api::response::Envelope)
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    if let Some(token) = extract_refresh_token(&headers) {
        if let Err(err) = auth_state.engine().logout(&token).await {
            error!("Failed to revoke session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response = ok(serde_json::json!({})).into_response();
    if let Ok(cookie) = clear_refresh_cookie(auth_state.config()) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::response::Envelope)
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return AuthError::Unauthenticated.into_response();
    };
    let claims = match auth_state.engine().access_claims(&token) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };
    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return AuthError::Unauthenticated.into_response();
    };

    match lookup_user_by_id(&pool, user_id).await {
        Ok(Some(user)) if user.is_active => ok(MeResponse {
            id: user.id.to_string(),
            email: user.email,
        })
        .into_response(),
        Ok(_) => AuthError::Unauthenticated.into_response(),
        Err(err) => AuthError::Internal(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(frontend: &str) -> AuthConfig {
        AuthConfig::new(
            frontend.to_string(),
            SecretString::from("pepper"),
            SecretString::from("jwt-secret"),
        )
    }

    #[test]
    fn refresh_cookie_attributes() {
        let expires_at = Utc::now() + chrono::Duration::seconds(120);
        let cookie = refresh_cookie(&config("https://renovigo.dev"), "jti.secret", expires_at)
            .ok()
            .and_then(|value| value.to_str().map(str::to_string).ok());
        let Some(cookie) = cookie else {
            panic!("cookie should build");
        };
        assert!(cookie.starts_with("renovigo_refresh=jti.secret"));
        assert!(cookie.contains("Path=/auth"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        let max_age = cookie
            .split("Max-Age=")
            .nth(1)
            .and_then(|rest| rest.split(';').next())
            .and_then(|value| value.parse::<i64>().ok());
        assert!(max_age.is_some_and(|age| (115..=120).contains(&age)));
    }

    #[test]
    fn refresh_cookie_not_secure_over_http() {
        let expires_at = Utc::now() + chrono::Duration::seconds(120);
        let cookie = refresh_cookie(&config("http://localhost:3000"), "jti.secret", expires_at)
            .ok()
            .and_then(|value| value.to_str().map(str::to_string).ok());
        assert!(cookie.is_some_and(|cookie| !cookie.contains("Secure")));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie(&config("https://renovigo.dev"))
            .ok()
            .and_then(|value| value.to_str().map(str::to_string).ok());
        assert!(cookie.is_some_and(|cookie| cookie.contains("Max-Age=0")));
    }

    #[test]
    fn extract_refresh_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; renovigo_refresh=jti.secret; theme=dark"),
        );
        assert_eq!(
            extract_refresh_token(&headers),
            Some("jti.secret".to_string())
        );
    }

    #[test]
    fn extract_refresh_token_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1"),
        );
        assert_eq!(extract_refresh_token(&headers), None);
        assert_eq!(extract_refresh_token(&HeaderMap::new()), None);
    }

    #[test]
    fn extract_bearer_token_variants() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(extract_bearer_token(&headers), Some("xyz".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
