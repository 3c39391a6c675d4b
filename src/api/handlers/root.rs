use axum::response::IntoResponse;

// axum handler for "/"
pub async fn root() -> impl IntoResponse {
    crate::APP_USER_AGENT
}
