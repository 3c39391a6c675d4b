//! # Renovigo (Session Authority)
//!
//! `renovigo` issues short-lived access tokens and long-lived rotating
//! refresh tokens, detects refresh-token replay, and revokes compromised
//! session families.
//!
//! ## Refresh-token rotation
//!
//! Every login starts a session **family**. Each refresh exchanges the
//! presented token for a successor row in the same family; the old row is
//! marked rotated and forward-linked to its replacement. Rotations of a
//! single token are serialized by a database row lock, so two concurrent
//! refreshes can never both mint a successor.
//!
//! ## Replay detection
//!
//! Presenting an already-rotated token is treated as evidence of theft and
//! revokes the whole family — unless the same rotation completed moments
//! ago, in which case a short-TTL replay cache lets the duplicate request
//! resolve to the identical successor instead of tripping the theft
//! response. The cache is best-effort: losing it only widens the
//! false-positive rate, never the durable state.
//!
//! ## Throttling
//!
//! Login, register, and refresh sit behind a sliding-window rate limiter
//! keyed by client IP and by email. Throttling is advisory (HTTP 429 with
//! `Retry-After`), not a security boundary on its own.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
