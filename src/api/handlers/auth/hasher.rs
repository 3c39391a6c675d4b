//! Keyed hashing for refresh-token secrets.
//!
//! Refresh tokens travel as `"{jti}.{secret}"`. The database stores an
//! HMAC-SHA256 of the full plaintext keyed with a server-side pepper, so a
//! leaked database alone does not reveal usable tokens.

use anyhow::{Context, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// A freshly minted refresh-token generation.
pub(crate) struct RefreshTokenParts {
    /// Plaintext sent to the client, `"{jti}.{secret}"`.
    pub(crate) plaintext: String,
    /// Hex HMAC digest of the plaintext; the only form that is persisted.
    pub(crate) hash: String,
    pub(crate) jti: String,
}

#[derive(Clone)]
pub(crate) struct CredentialHasher {
    pepper: SecretString,
}

impl CredentialHasher {
    pub(crate) fn new(pepper: SecretString) -> Self {
        Self { pepper }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.pepper.expose_secret().as_bytes())
            .context("failed to key refresh-token hasher")
    }

    /// Hex digest of the full refresh plaintext.
    pub(crate) fn hash(&self, plaintext: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(plaintext.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison against a stored hex digest.
    pub(crate) fn verify(&self, plaintext: &str, stored_hex: &str) -> bool {
        let Ok(stored) = hex::decode(stored_hex) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(plaintext.as_bytes());
        mac.verify_slice(&stored).is_ok()
    }

    /// Mint a new refresh-token generation: random `jti`, random secret,
    /// and the digest to persist. The plaintext is only ever returned to
    /// the client.
    pub(crate) fn new_refresh_pair(&self) -> Result<RefreshTokenParts> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate refresh secret")?;
        let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        let jti = Uuid::new_v4().to_string();
        let plaintext = format!("{jti}.{secret}");
        let hash = self.hash(&plaintext)?;
        Ok(RefreshTokenParts {
            plaintext,
            hash,
            jti,
        })
    }
}

/// Split a presented refresh plaintext into (`jti`, secret).
///
/// Returns `None` for anything malformed; callers reject those as invalid.
pub(crate) fn split_token(presented: &str) -> Option<(&str, &str)> {
    let (jti, secret) = presented.split_once('.')?;
    if jti.is_empty() || secret.is_empty() {
        return None;
    }
    Some((jti, secret))
}
