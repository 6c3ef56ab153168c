//! Optional API-key authentication, generalizing the teacher's shared-secret
//! middleware from HMAC request signing to a plain bearer-style equality check.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;

/// Rejects the request unless it carries an `X-Api-Key` header matching
/// `config.api_key`. A no-op when `config.api_key` is unset (§6: "optional API key").
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get("X-Api-Key")
        .and_then(|v| v.to_str().ok());

    if provided != Some(expected) {
        return (StatusCode::UNAUTHORIZED, "invalid or missing API key").into_response();
    }

    next.run(request).await
}
