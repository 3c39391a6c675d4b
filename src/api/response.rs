//! Uniform response envelope and the stable business-code table.
//!
//! Every JSON response is wrapped in `{code, message, data}`. HTTP status
//! communicates the class of the outcome; `code` is a stable numeric
//! business code and `message` a stable short label, never an internal
//! error string.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Business codes. One HTTP status may map to several codes; the code is
/// the finer-grained, stable identifier clients switch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BizCode {
    Ok,
    Unauthenticated,
    TokenExpired,
    TokenInvalid,
    ValidationError,
    InvalidRequest,
    Conflict,
    EmailExists,
    RateLimited,
    InternalError,
}

impl BizCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Unauthenticated => 1001,
            Self::TokenExpired => 1003,
            Self::TokenInvalid => 1004,
            Self::ValidationError => 2001,
            Self::InvalidRequest => 2003,
            Self::Conflict => 4001,
            Self::EmailExists => 4002,
            Self::RateLimited => 8001,
            Self::InternalError => 9001,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unauthenticated => "unauthenticated",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::ValidationError => "validation_error",
            Self::InvalidRequest => "invalid_request",
            Self::Conflict => "conflict",
            Self::EmailExists => "email_exists",
            Self::RateLimited => "rate_limited",
            Self::InternalError => "internal_error",
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Envelope {
    pub code: i32,
    pub message: String,
    #[schema(value_type = Object)]
    pub data: Option<Value>,
}

/// Success envelope with `code = 0`.
#[must_use]
pub fn ok<T: Serialize>(data: T) -> Json<Envelope> {
    Json(Envelope {
        code: BizCode::Ok.code(),
        message: BizCode::Ok.label().to_string(),
        data: serde_json::to_value(data).ok(),
    })
}

/// Failure envelope; `message` defaults to the code's stable label.
#[must_use]
pub fn fail(status: StatusCode, code: BizCode) -> Response {
    let envelope = Envelope {
        code: code.code(),
        message: code.label().to_string(),
        data: None,
    };
    (status, Json(envelope)).into_response()
}
