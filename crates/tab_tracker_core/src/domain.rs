//! crates/tab_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::duration::{format_millis, Mode, DEFAULT_TIMEZONE};

/// Longest URL (or favicon URL) the store accepts.
pub const MAX_URL_LENGTH: usize = 500;

/// Largest accepted `start_time`/`end_time`, in milliseconds.
pub const MAX_TIME_MS: i64 = 2_147_483_647;

/// Fixed page size of the interval listing.
pub const PAGE_SIZE: u32 = 20;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
}

/// An opaque bearer token. Each user owns at most one.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub key: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl AuthToken {
    /// A fresh random key: 40 lowercase hex characters.
    pub fn generate_key() -> String {
        let mut key = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        key.truncate(40);
        key
    }
}

/// A validated interval that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimeInterval {
    pub url: String,
    pub favicon_url: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub date: NaiveDate,
    /// Bare hostname of `url`, the key statistics are aggregated under.
    pub host: String,
}

impl NewTimeInterval {
    /// Milliseconds covered by the interval.
    pub fn duration_ms(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// A recorded span of active time on a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeInterval {
    pub id: i64,
    pub user_id: Uuid,
    pub url: String,
    pub favicon_url: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub date: NaiveDate,
    pub host: String,
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}-{}",
            self.url,
            self.date,
            format_millis(self.start_time, Mode::Clock, DEFAULT_TIMEZONE),
            format_millis(self.end_time, Mode::Clock, DEFAULT_TIMEZONE),
        )
    }
}

/// Aggregate counters for one hostname on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub id: i64,
    pub user_id: Uuid,
    /// Bare hostname, e.g. `example.com`.
    pub url: String,
    pub favicon_url: Option<String>,
    pub session_count: i64,
    /// Total milliseconds.
    pub time_count: i64,
    pub period_date: NaiveDate,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.url, self.period_date)
    }
}

/// A statistics row together with the intervals it was derived from,
/// ordered by date descending then start time ascending.
#[derive(Debug, Clone)]
pub struct StatisticsWithIntervals {
    pub statistics: Statistics,
    pub intervals: Vec<TimeInterval>,
}

/// Nests each interval under the statistics row with the same host and
/// date. Interval order is preserved.
pub fn attach_intervals(
    statistics: Vec<Statistics>,
    intervals: Vec<TimeInterval>,
) -> Vec<StatisticsWithIntervals> {
    let mut grouped: HashMap<(String, NaiveDate), Vec<TimeInterval>> = HashMap::new();
    for interval in intervals {
        grouped
            .entry((interval.host.clone(), interval.date))
            .or_default()
            .push(interval);
    }
    statistics
        .into_iter()
        .map(|statistics| {
            let intervals = grouped
                .remove(&(statistics.url.clone(), statistics.period_date))
                .unwrap_or_default();
            StatisticsWithIntervals {
                statistics,
                intervals,
            }
        })
        .collect()
}

/// Exact-match filters for the interval listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalFilter {
    pub date: Option<NaiveDate>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl IntervalFilter {
    pub fn matches(&self, interval: &TimeInterval) -> bool {
        self.date.map_or(true, |d| interval.date == d)
            && self.start_time.map_or(true, |s| interval.start_time == s)
            && self.end_time.map_or(true, |e| interval.end_time == e)
    }
}

/// One page of a listing. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Row offset of a 1-based page, or `None` when the page does not exist.
///
/// Page 1 always exists, even for an empty listing.
pub fn page_offset(page: u32, page_size: u32, total: u64) -> Option<u64> {
    if page == 0 {
        return None;
    }
    let offset = u64::from(page - 1) * u64::from(page_size);
    if page > 1 && offset >= total {
        return None;
    }
    Some(offset)
}
