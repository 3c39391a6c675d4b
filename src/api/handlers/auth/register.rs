//! Registration endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

use super::{
    error::AuthError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    state::AuthState,
    types::{RegisterRequest, RegisterResponse},
    users::{insert_user, SignupOutcome},
    utils::{extract_client_ip, normalize_email, valid_email, valid_password},
};
use crate::api::response::{fail, ok, BizCode};

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = crate::api::response::Envelope),
        (status = 422, description = "Validation error", body = crate::api::response::Envelope),
        (status = 429, description = "Rate limited", body = crate::api::response::Envelope)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, BizCode::InvalidRequest);
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || !valid_password(&request.password) {
        return fail(StatusCode::UNPROCESSABLE_ENTITY, BizCode::ValidationError);
    }

    let client_ip = extract_client_ip(&headers);
    if let RateLimitDecision::Limited {
        retry_after_seconds,
    } = auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
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
        .check_value(&email, RateLimitAction::Register)
        .await
    {
        return AuthError::RateLimited {
            retry_after_seconds,
        }
        .into_response();
    }

    let password_hash = match bcrypt::hash(&request.password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(err) => return AuthError::Internal(err.into()).into_response(),
    };

    match insert_user(&pool, &email, &password_hash, request.name.as_deref()).await {
        Ok(SignupOutcome::Created(user_id)) => ok(RegisterResponse {
            user_id: user_id.to_string(),
            email,
        })
        .into_response(),
        Ok(SignupOutcome::Conflict) => fail(StatusCode::CONFLICT, BizCode::EmailExists),
        Err(err) => AuthError::Internal(err).into_response(),
    }
}
