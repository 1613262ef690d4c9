//! services/api/src/web/statistics.rs
//!
//! Per-site daily statistics over a date range.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tab_tracker_core::domain::StatisticsWithIntervals;
use tab_tracker_core::duration::{format_millis, Mode};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::rest::IntervalDto;
use crate::web::state::AppState;

pub const NO_DATA_MESSAGE: &str = "No data for the selected period";

#[derive(Deserialize, IntoParams)]
pub struct StatisticsQuery {
    /// First day of the range, `YYYY-MM-DD`.
    pub period_date_start: Option<String>,
    /// Last day of the range (inclusive), `YYYY-MM-DD`.
    pub period_date_end: Option<String>,
}

impl StatisticsQuery {
    fn range(&self) -> Result<(NaiveDate, NaiveDate), ApiError> {
        let (Some(start), Some(end)) = (
            self.period_date_start.as_deref(),
            self.period_date_end.as_deref(),
        ) else {
            return Err(ApiError::BadRequest(
                "Both period_date_start and period_date_end are required".to_string(),
            ));
        };

        let parse = |raw: &str| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ApiError::BadRequest(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
            })
        };
        let (start, end) = (parse(start)?, parse(end)?);

        if start > end {
            return Err(ApiError::BadRequest(
                "period_date_start must not be after period_date_end".to_string(),
            ));
        }
        Ok((start, end))
    }
}

/// One site on one day.
#[derive(Serialize, ToSchema)]
pub struct StatisticsDto {
    pub id: i64,
    /// Bare hostname.
    pub url: String,
    pub favicon_url: Option<String>,
    pub session_count: i64,
    /// Total milliseconds.
    pub time_count: i64,
    /// `time_count` as `HH:MM`.
    pub time_spent: String,
    pub period_date: NaiveDate,
    pub intervals: Vec<IntervalDto>,
}

impl StatisticsDto {
    fn from_domain(row: StatisticsWithIntervals, tz: Tz) -> Self {
        let s = row.statistics;
        Self {
            id: s.id,
            time_spent: format_millis(s.time_count, Mode::Duration, tz),
            url: s.url,
            favicon_url: s.favicon_url,
            session_count: s.session_count,
            time_count: s.time_count,
            period_date: s.period_date,
            intervals: row
                .intervals
                .into_iter()
                .map(|i| IntervalDto::from_domain(i, tz))
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct NoDataResponse {
    pub message: String,
}

/// GET /api/statistics/ - Statistics of the caller within a date range
///
/// Rows are ordered by total time, largest first.
#[utoipa::path(
    get,
    path = "/api/statistics/",
    params(StatisticsQuery),
    responses(
        (status = 200, description = "Statistics with their intervals, or a NoDataResponse when nothing was recorded", body = Vec<StatisticsDto>),
        (status = 400, description = "Missing or invalid dates", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("token" = []))
)]
pub async fn statistics_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Response, ApiError> {
    let (start, end) = query.range()?;

    let rows = state.db.statistics_in_range(user_id, start, end).await?;
    if rows.is_empty() {
        return Ok(Json(NoDataResponse {
            message: NO_DATA_MESSAGE.to_string(),
        })
        .into_response());
    }

    let tz = state.config.display_timezone;
    let body: Vec<StatisticsDto> = rows
        .into_iter()
        .map(|row| StatisticsDto::from_domain(row, tz))
        .collect();
    Ok(Json(body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(start: Option<&str>, end: Option<&str>) -> StatisticsQuery {
        StatisticsQuery {
            period_date_start: start.map(str::to_string),
            period_date_end: end.map(str::to_string),
        }
    }

    #[test]
    fn range_accepts_single_day() {
        let (start, end) = query(Some("2025-01-01"), Some("2025-01-01")).range().unwrap();
        assert_eq!(start, end);
    }

    #[test]
    fn range_requires_both_ends() {
        assert!(matches!(query(Some("2025-01-01"), None).range(), Err(ApiError::BadRequest(_))));
        assert!(matches!(query(None, None).range(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn range_rejects_bad_format_and_reversed_order() {
        assert!(query(Some("2025/01/01"), Some("2025-01-02")).range().is_err());
        assert!(query(Some("2025-01-03"), Some("2025-01-02")).range().is_err());
    }
}
