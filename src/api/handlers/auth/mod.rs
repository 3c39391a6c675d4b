//! Auth handlers and supporting modules.
//!
//! This module coordinates credential verification, refresh-token rotation,
//! replay detection, and request throttling.
//!
//! ## Rotation and the grace window
//!
//! Each refresh exchanges the presented token for a successor row in the
//! same family under a database row lock. A just-completed rotation is
//! remembered in a short-TTL replay cache so a duplicated request (client
//! retry, proxy replay) resolves to the identical successor. Reuse of a
//! rotated token outside that window revokes the whole family.
//!
//! ## Rate limiting
//!
//! Login, register, and refresh are throttled per client IP and per email
//! before any credential work happens. Decisions are advisory (429 with
//! `Retry-After`); the limiter fails open if its backing store is down.

mod error;
mod hasher;
pub(crate) mod login;
mod rate_limit;
pub(crate) mod refresh;
pub(crate) mod register;
mod replay;
mod rotation;
pub(crate) mod session;
mod sessions;
mod state;
mod token;
pub(crate) mod types;
mod users;
mod utils;

pub use rate_limit::{NoopRateLimiter, RateLimitSettings, RateLimiter, RedisRateLimiter};
pub use state::{AuthConfig, AuthState};

pub(crate) use replay::{RedisReplayCache, ReplayCache};
pub(crate) use rotation::RotationEngine;
pub(crate) use sessions::{PgSessionStore, SessionStore};

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests;
