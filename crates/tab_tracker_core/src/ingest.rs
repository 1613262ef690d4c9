//! crates/tab_tracker_core/src/ingest.rs
//!
//! The storage-independent half of interval ingestion: turning raw
//! descriptors into validated intervals, separating duplicates, and
//! folding the remainder into per-(hostname, date) statistics deltas.
//! Storage adapters run this inside their own transaction.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::domain::{NewTimeInterval, MAX_TIME_MS, MAX_URL_LENGTH};
use crate::validation::{hostname, truncate_to_origin, validate_browser_url, ValidationError};

/// A descriptor as submitted by a client, after required-field extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalDraft {
    pub start_time: i64,
    pub end_time: i64,
    pub date: String,
    pub url: String,
    pub favicon_url: Option<String>,
}

/// Identity of an interval for duplicate detection (the owner is implied).
pub type IntervalKey = (String, NaiveDate, i64, i64);

pub fn interval_key(interval: &NewTimeInterval) -> IntervalKey {
    (
        interval.url.clone(),
        interval.date,
        interval.start_time,
        interval.end_time,
    )
}

/// Counters to add to the statistics row of one (hostname, date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsDelta {
    pub url: String,
    pub period_date: NaiveDate,
    pub session_count: i64,
    pub time_count: i64,
    pub favicon_url: Option<String>,
}

/// Outcome reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub processed: usize,
    pub duplicates: usize,
}

/// Everything a store has to write for one batch.
#[derive(Debug, Clone)]
pub struct IngestPlan {
    pub processed: usize,
    /// Intervals to insert, in submission order.
    pub fresh: Vec<NewTimeInterval>,
    /// Statistics increments, in first-seen order.
    pub deltas: Vec<StatisticsDelta>,
}

impl IngestPlan {
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            processed: self.processed,
            duplicates: self.processed - self.fresh.len(),
        }
    }
}

/// Truncates oversized fields, then validates a single descriptor.
pub fn normalize(draft: IntervalDraft) -> Result<NewTimeInterval, ValidationError> {
    let url = if draft.url.chars().count() > MAX_URL_LENGTH {
        truncate_to_origin(&draft.url)
    } else {
        draft.url
    };
    let favicon_url = draft
        .favicon_url
        .filter(|f| f.chars().count() <= MAX_URL_LENGTH);

    validate_browser_url(&url)?;
    if let Some(favicon) = &favicon_url {
        validate_browser_url(favicon)?;
    }

    if draft.start_time < 0 {
        return Err(ValidationError::NegativeTime("startTime"));
    }
    if draft.end_time < 0 {
        return Err(ValidationError::NegativeTime("endTime"));
    }
    if draft.start_time > MAX_TIME_MS {
        return Err(ValidationError::TimeTooLarge("startTime"));
    }
    if draft.end_time > MAX_TIME_MS {
        return Err(ValidationError::TimeTooLarge("endTime"));
    }
    if draft.start_time >= draft.end_time {
        return Err(ValidationError::EndBeforeStart);
    }

    let date = NaiveDate::parse_from_str(&draft.date, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(draft.date.clone()))?;

    Ok(NewTimeInterval {
        host: hostname(&url),
        url,
        favicon_url,
        start_time: draft.start_time,
        end_time: draft.end_time,
        date,
    })
}

/// Normalizes a whole batch. The first invalid descriptor fails the batch.
pub fn prepare_batch(drafts: Vec<IntervalDraft>) -> Result<Vec<NewTimeInterval>, ValidationError> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| {
            normalize(draft).map_err(|e| ValidationError::InBatch {
                index,
                source: Box::new(e),
            })
        })
        .collect()
}

/// Distinct (url, date) pairs of a batch, so that existing rows can be
/// fetched with a single query.
pub fn lookup_pairs(candidates: &[NewTimeInterval]) -> Vec<(String, NaiveDate)> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(|c| (c.url.clone(), c.date))
        .filter(|pair| seen.insert(pair.clone()))
        .collect()
}

/// Splits `candidates` into fresh intervals and duplicates, and aggregates
/// the fresh ones.
///
/// A candidate is a duplicate when `existing` already holds its key or an
/// earlier candidate in the same batch had the same key.
pub fn plan(candidates: Vec<NewTimeInterval>, existing: &HashSet<IntervalKey>) -> IngestPlan {
    let processed = candidates.len();
    let mut seen: HashSet<IntervalKey> = HashSet::new();
    let mut fresh = Vec::with_capacity(candidates.len());
    let mut deltas: Vec<StatisticsDelta> = Vec::new();
    let mut slots: HashMap<(String, NaiveDate), usize> = HashMap::new();

    for candidate in candidates {
        let key = interval_key(&candidate);
        if existing.contains(&key) || !seen.insert(key) {
            continue;
        }

        let slot = *slots
            .entry((candidate.host.clone(), candidate.date))
            .or_insert_with(|| {
                deltas.push(StatisticsDelta {
                    url: candidate.host.clone(),
                    period_date: candidate.date,
                    session_count: 0,
                    time_count: 0,
                    favicon_url: None,
                });
                deltas.len() - 1
            });

        let delta = &mut deltas[slot];
        delta.session_count = delta.session_count.saturating_add(1);
        delta.time_count = delta.time_count.saturating_add(candidate.duration_ms());
        if delta.favicon_url.is_none() {
            delta.favicon_url = candidate.favicon_url.clone();
        }

        fresh.push(candidate);
    }

    IngestPlan {
        processed,
        fresh,
        deltas,
    }
}
