//! services/api/src/web/intervals.rs
//!
//! Interval ingestion and listing endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tab_tracker_core::domain::IntervalFilter;
use tab_tracker_core::ingest::{prepare_batch, IntervalDraft};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::rest::{parse_json, IntervalDto};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateIntervalsRequest {
    #[serde(default)]
    pub intervals: Vec<IntervalDescriptor>,
}

/// One interval as reported by the browser extension. Every field except
/// `faviconUrl` is required; they are optional here so that a missing one
/// can be named in the error.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntervalDescriptor {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    /// `YYYY-MM-DD`.
    pub date: Option<String>,
    pub url: Option<String>,
    pub favicon_url: Option<String>,
}

impl IntervalDescriptor {
    fn into_draft(self) -> Result<IntervalDraft, ApiError> {
        Ok(IntervalDraft {
            start_time: self.start_time.ok_or(ApiError::MissingField("startTime"))?,
            end_time: self.end_time.ok_or(ApiError::MissingField("endTime"))?,
            date: self.date.ok_or(ApiError::MissingField("date"))?,
            url: self.url.ok_or(ApiError::MissingField("url"))?,
            favicon_url: self.favicon_url,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct CreateIntervalsResponse {
    pub status: String,
    pub processed: usize,
    pub duplicates: usize,
}

#[derive(Deserialize, IntoParams)]
pub struct IntervalQuery {
    /// Exact date, `YYYY-MM-DD`.
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// 1-based page number.
    pub page: Option<String>,
}

/// A page of intervals.
#[derive(Serialize, ToSchema)]
pub struct IntervalListResponse {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<IntervalDto>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl IntervalQuery {
    fn filter(&self) -> Result<IntervalFilter, ApiError> {
        let date = present(&self.date)
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| ApiError::BadRequest("date: Enter a valid date.".to_string()))
            })
            .transpose()?;
        let parse_ms = |value: &Option<String>, name: &str| {
            present(value)
                .map(|raw| {
                    raw.parse::<i64>().map_err(|_| {
                        ApiError::BadRequest(format!("{}: Enter a whole number.", name))
                    })
                })
                .transpose()
        };
        Ok(IntervalFilter {
            date,
            start_time: parse_ms(&self.start_time, "start_time")?,
            end_time: parse_ms(&self.end_time, "end_time")?,
        })
    }

    fn page(&self) -> Result<u32, ApiError> {
        match present(&self.page) {
            None => Ok(1),
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ApiError::NotFound("Invalid page.".to_string())),
        }
    }
}

/// Relative link to another page of the same filtered listing.
fn page_link(filter: &IntervalFilter, page: u32) -> String {
    let mut params = Vec::new();
    if let Some(date) = filter.date {
        params.push(format!("date={}", date));
    }
    if let Some(start_time) = filter.start_time {
        params.push(format!("start_time={}", start_time));
    }
    if let Some(end_time) = filter.end_time {
        params.push(format!("end_time={}", end_time));
    }
    params.push(format!("page={}", page));
    format!("/api/intervals/?{}", params.join("&"))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/create_intervals/ - Store a batch of intervals and update statistics
///
/// The batch is applied atomically: one invalid interval rejects all of them.
#[utoipa::path(
    post,
    path = "/api/create_intervals/",
    request_body = CreateIntervalsRequest,
    responses(
        (status = 200, description = "Batch stored", body = CreateIntervalsResponse),
        (status = 400, description = "Invalid JSON, missing field or invalid interval", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    security(("token" = []))
)]
pub async fn create_intervals_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    body: Bytes,
) -> Result<Json<CreateIntervalsResponse>, ApiError> {
    let request: CreateIntervalsRequest = parse_json(&body)?;

    let drafts = request
        .intervals
        .into_iter()
        .map(IntervalDescriptor::into_draft)
        .collect::<Result<Vec<_>, _>>()?;

    let batch = prepare_batch(drafts).map_err(|e| {
        warn!("Rejected interval batch for user {}: {}", user_id, e);
        ApiError::from(e)
    })?;

    let summary = state.db.ingest_intervals(user_id, batch).await?;
    info!(
        "Ingested intervals for user {}: processed={}, duplicates={}",
        user_id, summary.processed, summary.duplicates
    );

    Ok(Json(CreateIntervalsResponse {
        status: "success".to_string(),
        processed: summary.processed,
        duplicates: summary.duplicates,
    }))
}

/// GET /api/intervals/ - List the caller's intervals
///
/// Ordered by date (newest first), then start time.
#[utoipa::path(
    get,
    path = "/api/intervals/",
    params(IntervalQuery),
    responses(
        (status = 200, description = "One page of intervals", body = IntervalListResponse),
        (status = 400, description = "Invalid filter value", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Invalid page", body = ErrorBody)
    ),
    security(("token" = []))
)]
pub async fn list_intervals_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<IntervalQuery>,
) -> Result<Json<IntervalListResponse>, ApiError> {
    let filter = query.filter()?;
    let page_number = query.page()?;

    let page = state.db.list_intervals(user_id, &filter, page_number).await?;
    let tz = state.config.display_timezone;

    Ok(Json(IntervalListResponse {
        count: page.total,
        next: page.has_next().then(|| page_link(&filter, page.page + 1)),
        previous: page.has_previous().then(|| page_link(&filter, page.page - 1)),
        results: page
            .items
            .into_iter()
            .map(|i| IntervalDto::from_domain(i, tz))
            .collect(),
    }))
}

/// GET /api/intervals/{id}/ - Fetch one of the caller's intervals
#[utoipa::path(
    get,
    path = "/api/intervals/{id}/",
    params(("id" = i64, Path, description = "Interval id")),
    responses(
        (status = 200, description = "The interval", body = IntervalDto),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "No such interval", body = ErrorBody)
    ),
    security(("token" = []))
)]
pub async fn get_interval_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(interval_id): Path<i64>,
) -> Result<Json<IntervalDto>, ApiError> {
    let interval = state.db.get_interval(user_id, interval_id).await?;
    Ok(Json(IntervalDto::from_domain(
        interval,
        state.config.display_timezone,
    )))
}
