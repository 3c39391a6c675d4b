//! Typed domain errors for the auth endpoints.
//!
//! Validation and state-machine failures are explicit values with a fixed
//! HTTP status and stable short label; only unexpected failures fall
//! through to a generic 500 with no internal detail exposed.

use crate::api::response::{fail, BizCode};
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub(crate) enum AuthError {
    /// Missing or unusable credentials (no cookie, bad password, bad bearer token).
    #[error("unauthenticated")]
    Unauthenticated,
    /// Malformed plaintext, unknown `jti`, or hash mismatch. The three are
    /// deliberately indistinguishable to the caller.
    #[error("token_invalid")]
    TokenInvalid,
    /// The session row exists but is past `expires_at`.
    #[error("token_expired")]
    TokenExpired,
    /// The session row was already revoked and replay recovery failed; the
    /// family has been revoked as a side effect.
    #[error("token_revoked")]
    TokenRevoked,
    /// Throttled before reaching the rotation logic.
    #[error("rate_limited")]
    RateLimited { retry_after_seconds: u64 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub(crate) const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated
            | Self::TokenInvalid
            | Self::TokenExpired
            | Self::TokenRevoked => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) const fn biz_code(&self) -> BizCode {
        match self {
            Self::Unauthenticated => BizCode::Unauthenticated,
            Self::TokenInvalid => BizCode::TokenInvalid,
            Self::TokenExpired => BizCode::TokenExpired,
            // Revoked tokens surface as invalid credentials; the side
            // effect (family revocation) already happened.
            Self::TokenRevoked => BizCode::TokenInvalid,
            Self::RateLimited { .. } => BizCode::RateLimited,
            Self::Internal(_) => BizCode::InternalError,
        }
    }

    const fn challenge(&self) -> Option<&'static str> {
        match self {
            Self::Unauthenticated => Some("Bearer"),
            Self::TokenInvalid | Self::TokenRevoked => Some(r#"Bearer error="invalid_token""#),
            Self::TokenExpired => {
                Some(r#"Bearer error="invalid_token", error_description="expired""#)
            }
            _ => None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("auth request failed: {err:#}");
        }

        let mut response = fail(self.status(), self.biz_code());
        if let Some(challenge) = self.challenge() {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        if let Self::RateLimited {
            retry_after_seconds,
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}
