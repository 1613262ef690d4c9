//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: account creation, token login and CSRF token
//! issuance for browser form flows.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tab_tracker_core::ports::PortError;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::rest::parse_json;
use crate::web::state::AppState;

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_TOKEN_LENGTH: usize = 32;
/// One year, in seconds.
const CSRF_COOKIE_MAX_AGE: i64 = 60 * 60 * 24 * 364;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CredentialsRequest {
    /// Both fields, or a 400 when either is absent or empty.
    fn require(&self) -> Result<(&str, &str), ApiError> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok((username, password))
            }
            _ => Err(ApiError::BadRequest(
                "Username and password required".to_string(),
            )),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
}

#[derive(Serialize, ToSchema)]
pub struct CsrfResponse {
    #[serde(rename = "csrfToken")]
    pub csrf_token: String,
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".to_string())
}

/// Extracts a cookie value from the `Cookie` header.
pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| {
            let (key, value) = c.trim().split_once('=')?;
            (key == name).then_some(value)
        })
}

fn is_valid_csrf_token(token: &str) -> bool {
    token.len() == CSRF_TOKEN_LENGTH && token.chars().all(|c| c.is_ascii_alphanumeric())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/users/ - Create a new user account
#[utoipa::path(
    post,
    path = "/api/users/",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "User created successfully", body = UserResponse),
        (status = 400, description = "Missing field or username taken", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: CredentialsRequest = parse_json(&body)?;
    let (username, password) = request.require()?;

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create user in database
    let user = state.db.create_user(username, &password_hash).await?;
    info!("Created user {}", user.username);

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            username: user.username,
        }),
    ))
}

/// POST /api/login/ - Exchange credentials for the user's token
///
/// The same token is returned on every login until it is revoked.
#[utoipa::path(
    post,
    path = "/api/login/",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Username or password missing", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TokenResponse>, ApiError> {
    let request: CredentialsRequest = parse_json(&body)?;
    let (username, password) = request.require()?;

    // 1. Get user by username
    let credentials = match state.db.get_user_credentials(username).await {
        Ok(credentials) => credentials,
        Err(PortError::NotFound(_)) => return Err(invalid_credentials()),
        Err(e) => return Err(e.into()),
    };

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&credentials.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;

    let valid = Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(invalid_credentials());
    }

    // 3. Issue (or reuse) the token
    let token = state.db.get_or_create_token(credentials.user_id).await?;
    info!("User {} logged in", credentials.username);

    Ok(Json(TokenResponse { token: token.key }))
}

/// GET /api/csrf/ - Issue a CSRF token for same-site form posts
///
/// A valid `csrftoken` cookie is reused; otherwise a new token is set.
#[utoipa::path(
    get,
    path = "/api/csrf/",
    responses(
        (status = 200, description = "CSRF token", body = CsrfResponse)
    )
)]
pub async fn csrf_handler(headers: HeaderMap) -> impl IntoResponse {
    let token = cookie_value(&headers, CSRF_COOKIE)
        .filter(|t| is_valid_csrf_token(t))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let cookie = format!(
        "{}={}; SameSite=Lax; Path=/; Max-Age={}",
        CSRF_COOKIE, token, CSRF_COOKIE_MAX_AGE
    );

    (
        [(header::SET_COOKIE, cookie)],
        Json(CsrfResponse { csrf_token: token }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn credentials_must_be_present_and_non_empty() {
        let full = CredentialsRequest {
            username: Some("a@b.c".to_string()),
            password: Some("pw".to_string()),
        };
        assert_eq!(full.require().unwrap(), ("a@b.c", "pw"));

        let empty_password = CredentialsRequest {
            username: Some("a@b.c".to_string()),
            password: Some(String::new()),
        };
        assert!(matches!(empty_password.require(), Err(ApiError::BadRequest(_))));

        let missing = CredentialsRequest {
            username: None,
            password: Some("pw".to_string()),
        };
        assert!(missing.require().is_err());
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; csrftoken=abc; other=1"),
        );
        assert_eq!(cookie_value(&headers, "csrftoken"), Some("abc"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn csrf_tokens_are_32_alphanumerics() {
        assert!(is_valid_csrf_token(&Uuid::new_v4().simple().to_string()));
        assert!(!is_valid_csrf_token("short"));
        assert!(!is_valid_csrf_token(&"-".repeat(32)));
    }
}
