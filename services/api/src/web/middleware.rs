//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tab_tracker_core::ports::PortError;
use tracing::debug;

use crate::error::ApiError;
use crate::web::state::AppState;

/// Pulls the key out of `Authorization: Token <key>` (or `Bearer <key>`).
fn token_from_header(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    let known = scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer");
    (known && !key.is_empty()).then_some(key)
}

/// Middleware that validates the auth token and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the token from the Authorization header
    let key = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(token_from_header)
        .ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
        })?
        .to_string();

    // 2. Resolve the token to its owner
    let user_id = match state.db.user_for_token(&key).await {
        Ok(user_id) => user_id,
        Err(PortError::Unauthorized) => {
            debug!("Rejected unknown token");
            return Err(ApiError::Unauthorized("Invalid token.".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    // 3. Insert user_id into request extensions
    req.extensions_mut().insert(user_id);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_and_bearer_schemes() {
        assert_eq!(token_from_header("Token abc123"), Some("abc123"));
        assert_eq!(token_from_header("bearer abc123"), Some("abc123"));
        assert_eq!(token_from_header("Basic abc123"), None);
        assert_eq!(token_from_header("Token "), None);
        assert_eq!(token_from_header("abc123"), None);
    }
}
