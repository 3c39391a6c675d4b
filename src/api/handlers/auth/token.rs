//! Stateless access-token issuing and verification.

use super::error::AuthError;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccessClaims {
    pub(crate) sub: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

#[derive(Clone)]
pub(crate) struct AccessTokenIssuer {
    secret: SecretString,
    ttl_seconds: i64,
}

impl AccessTokenIssuer {
    pub(crate) fn new(secret: SecretString, ttl_seconds: i64) -> Self {
        Self {
            secret,
            ttl_seconds,
        }
    }

    /// Sign a short-lived bearer token for the user.
    pub(crate) fn issue(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .context("failed to sign access token")
    }

    /// Verify signature and expiry; expired tokens are reported distinctly
    /// so clients know to refresh rather than re-authenticate.
    pub(crate) fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::Unauthenticated,
        })
    }
}
