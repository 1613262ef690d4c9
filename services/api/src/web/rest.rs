//! services/api/src/web/rest.rs
//!
//! Shared pieces of the REST API: the master definition for the OpenAPI
//! document, payload structs used by more than one endpoint, and JSON
//! body parsing.

use axum::body::Bytes;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::error::Category;
use tab_tracker_core::domain::TimeInterval;
use tab_tracker_core::duration::{format_millis, Mode};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::{auth, intervals, statistics};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        intervals::create_intervals_handler,
        intervals::list_intervals_handler,
        intervals::get_interval_handler,
        statistics::statistics_handler,
        auth::login_handler,
        auth::signup_handler,
        auth::csrf_handler,
    ),
    components(
        schemas(
            ErrorBody,
            IntervalDto,
            intervals::CreateIntervalsRequest,
            intervals::IntervalDescriptor,
            intervals::CreateIntervalsResponse,
            intervals::IntervalListResponse,
            statistics::StatisticsDto,
            statistics::NoDataResponse,
            auth::CredentialsRequest,
            auth::TokenResponse,
            auth::UserResponse,
            auth::CsrfResponse,
        )
    ),
    modifiers(&TokenSecurity),
    tags(
        (name = "Tab Tracker API", description = "Browser tab-time intervals and per-site daily statistics.")
    )
)]
pub struct ApiDoc;

/// Registers the `Authorization: Token <key>` scheme.
struct TokenSecurity;

impl utoipa::Modify for TokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "Authorization",
                "Token <key>",
            ))),
        );
    }
}

//=========================================================================================
// Shared Payload Structs
//=========================================================================================

/// A stored interval as returned by the API.
#[derive(Serialize, ToSchema)]
pub struct IntervalDto {
    pub id: i64,
    pub url: String,
    pub favicon_url: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    /// `start_time` as local `HH:MM` in the configured timezone.
    pub start_clock: String,
    /// `end_time` as local `HH:MM` in the configured timezone.
    pub end_clock: String,
    pub date: NaiveDate,
    pub user: Uuid,
}

impl IntervalDto {
    pub fn from_domain(interval: TimeInterval, tz: Tz) -> Self {
        Self {
            start_clock: format_millis(interval.start_time, Mode::Clock, tz),
            end_clock: format_millis(interval.end_time, Mode::Clock, tz),
            id: interval.id,
            url: interval.url,
            favicon_url: interval.favicon_url,
            start_time: interval.start_time,
            end_time: interval.end_time,
            date: interval.date,
            user: interval.user_id,
        }
    }
}

//=========================================================================================
// Body Parsing
//=========================================================================================

/// Deserializes a JSON request body.
///
/// Syntax errors become `InvalidJson`; well-formed JSON of the wrong shape
/// becomes a `BadRequest` carrying serde's message.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| match e.classify() {
        Category::Syntax | Category::Eof => ApiError::InvalidJson,
        Category::Data => ApiError::BadRequest(e.to_string()),
        Category::Io => ApiError::Internal(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Probe {
        #[allow(dead_code)]
        value: i64,
    }

    #[test]
    fn parse_json_distinguishes_syntax_from_shape() {
        assert!(parse_json::<Probe>(&Bytes::from_static(br#"{"value": 1}"#)).is_ok());
        assert!(matches!(
            parse_json::<Probe>(&Bytes::from_static(b"invalid json")),
            Err(ApiError::InvalidJson)
        ));
        assert!(matches!(
            parse_json::<Probe>(&Bytes::new()),
            Err(ApiError::InvalidJson)
        ));
        assert!(matches!(
            parse_json::<Probe>(&Bytes::from_static(br#"{"value": "one"}"#)),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn openapi_document_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/create_intervals/",
            "/api/intervals/",
            "/api/intervals/{id}/",
            "/api/statistics/",
            "/api/login/",
            "/api/users/",
            "/api/csrf/",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
