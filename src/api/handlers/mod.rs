//! API handlers for the session authority.

pub mod auth;
pub mod health;
pub mod root;
