//! services/api/src/adapters/memory.rs
//!
//! An in-memory implementation of the `DatabaseService` port, used by the
//! test suite and for running the server without PostgreSQL
//! (`DATABASE_URL=memory://`). Data lives for the life of the process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tab_tracker_core::domain::{
    attach_intervals, page_offset, AuthToken, IntervalFilter, NewTimeInterval, Page, Statistics,
    StatisticsWithIntervals, TimeInterval, User, UserCredentials, PAGE_SIZE,
};
use tab_tracker_core::ingest::{self, IngestSummary, IntervalKey};
use tab_tracker_core::ports::{DatabaseService, PortError, PortResult};
use tokio::sync::RwLock;
use uuid::Uuid;

struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryData {
    users: Vec<UserRow>,
    tokens: HashMap<String, AuthToken>,
    intervals: Vec<TimeInterval>,
    statistics: Vec<Statistics>,
    next_interval_id: i64,
    next_statistics_id: i64,
}

impl MemoryData {
    fn statistics_index(&self, user_id: Uuid, url: &str, date: NaiveDate) -> Option<usize> {
        self.statistics
            .iter()
            .position(|s| s.user_id == user_id && s.url == url && s.period_date == date)
    }

    fn favicon_for(&self, user_id: Uuid, url: &str) -> Option<String> {
        self.statistics
            .iter()
            .filter(|s| s.user_id == user_id && s.url == url)
            .find_map(|s| s.favicon_url.clone())
    }
}

/// In-memory store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    data: Arc<RwLock<MemoryData>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intervals across all users.
    pub async fn interval_count(&self) -> usize {
        self.data.read().await.intervals.len()
    }

    /// All statistics rows of a user, in creation order.
    pub async fn statistics_for(&self, user_id: Uuid) -> Vec<Statistics> {
        self.data
            .read()
            .await
            .statistics
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All intervals of a user, in insertion order.
    pub async fn intervals_for(&self, user_id: Uuid) -> Vec<TimeInterval> {
        self.data
            .read()
            .await
            .intervals
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect()
    }
}

fn interval_order(a: &TimeInterval, b: &TimeInterval) -> std::cmp::Ordering {
    b.date
        .cmp(&a.date)
        .then(a.start_time.cmp(&b.start_time))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl DatabaseService for MemoryAdapter {
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User> {
        let mut data = self.data.write().await;
        if data.users.iter().any(|u| u.username == username) {
            return Err(PortError::Conflict(format!(
                "A user named '{}' already exists",
                username
            )));
        }
        let row = UserRow {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: hashed_password.to_string(),
            created_at: Utc::now(),
        };
        let user = User {
            id: row.id,
            username: row.username.clone(),
            created_at: row.created_at,
        };
        data.users.push(row);
        Ok(user)
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let data = self.data.read().await;
        data.users
            .iter()
            .find(|u| u.username == username)
            .map(|u| UserCredentials {
                user_id: u.id,
                username: u.username.clone(),
                hashed_password: u.password_hash.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn get_or_create_token(&self, user_id: Uuid) -> PortResult<AuthToken> {
        let mut data = self.data.write().await;
        if let Some(token) = data.tokens.values().find(|t| t.user_id == user_id) {
            return Ok(token.clone());
        }
        if !data.users.iter().any(|u| u.id == user_id) {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        let token = AuthToken {
            key: AuthToken::generate_key(),
            user_id,
            created_at: Utc::now(),
        };
        data.tokens.insert(token.key.clone(), token.clone());
        Ok(token)
    }

    async fn user_for_token(&self, key: &str) -> PortResult<Uuid> {
        self.data
            .read()
            .await
            .tokens
            .get(key)
            .map(|t| t.user_id)
            .ok_or(PortError::Unauthorized)
    }

    async fn ingest_intervals(
        &self,
        user_id: Uuid,
        batch: Vec<NewTimeInterval>,
    ) -> PortResult<IngestSummary> {
        // The write guard is held for the whole batch, which makes it atomic.
        let mut data = self.data.write().await;

        let pairs: HashSet<(String, NaiveDate)> =
            ingest::lookup_pairs(&batch).into_iter().collect();
        let existing: HashSet<IntervalKey> = data
            .intervals
            .iter()
            .filter(|i| i.user_id == user_id && pairs.contains(&(i.url.clone(), i.date)))
            .map(|i| (i.url.clone(), i.date, i.start_time, i.end_time))
            .collect();

        let plan = ingest::plan(batch, &existing);

        for delta in &plan.deltas {
            let fallback = match &delta.favicon_url {
                Some(_) => None,
                None => data.favicon_for(user_id, &delta.url),
            };
            match data.statistics_index(user_id, &delta.url, delta.period_date) {
                Some(index) => {
                    let row = &mut data.statistics[index];
                    row.session_count = row.session_count.saturating_add(delta.session_count);
                    row.time_count = row.time_count.saturating_add(delta.time_count);
                    if row.favicon_url.is_none() {
                        row.favicon_url = delta.favicon_url.clone().or(fallback);
                    }
                }
                None => {
                    data.next_statistics_id += 1;
                    let id = data.next_statistics_id;
                    data.statistics.push(Statistics {
                        id,
                        user_id,
                        url: delta.url.clone(),
                        favicon_url: delta.favicon_url.clone().or(fallback),
                        session_count: delta.session_count,
                        time_count: delta.time_count,
                        period_date: delta.period_date,
                    });
                }
            }
        }

        let summary = plan.summary();
        for interval in plan.fresh {
            data.next_interval_id += 1;
            let id = data.next_interval_id;
            data.intervals.push(TimeInterval {
                id,
                user_id,
                url: interval.url,
                favicon_url: interval.favicon_url,
                start_time: interval.start_time,
                end_time: interval.end_time,
                date: interval.date,
                host: interval.host,
            });
        }

        Ok(summary)
    }

    async fn list_intervals(
        &self,
        user_id: Uuid,
        filter: &IntervalFilter,
        page: u32,
    ) -> PortResult<Page<TimeInterval>> {
        let data = self.data.read().await;
        let mut matching: Vec<TimeInterval> = data
            .intervals
            .iter()
            .filter(|i| i.user_id == user_id && filter.matches(i))
            .cloned()
            .collect();
        matching.sort_by(interval_order);

        let total = matching.len() as u64;
        let offset = page_offset(page, PAGE_SIZE, total)
            .ok_or_else(|| PortError::NotFound("Invalid page.".to_string()))?;

        let items = matching
            .into_iter()
            .skip(offset as usize)
            .take(PAGE_SIZE as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page,
            page_size: PAGE_SIZE,
        })
    }

    async fn get_interval(&self, user_id: Uuid, interval_id: i64) -> PortResult<TimeInterval> {
        self.data
            .read()
            .await
            .intervals
            .iter()
            .find(|i| i.id == interval_id && i.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Interval {} not found", interval_id)))
    }

    async fn statistics_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<StatisticsWithIntervals>> {
        let data = self.data.read().await;

        let mut statistics: Vec<Statistics> = data
            .statistics
            .iter()
            .filter(|s| s.user_id == user_id && s.period_date >= start && s.period_date <= end)
            .cloned()
            .collect();
        statistics.sort_by(|a, b| b.time_count.cmp(&a.time_count).then(a.id.cmp(&b.id)));

        let hosts: HashSet<&str> = statistics.iter().map(|s| s.url.as_str()).collect();
        let mut intervals: Vec<TimeInterval> = data
            .intervals
            .iter()
            .filter(|i| {
                i.user_id == user_id
                    && i.date >= start
                    && i.date <= end
                    && hosts.contains(i.host.as_str())
            })
            .cloned()
            .collect();
        intervals.sort_by(interval_order);

        Ok(attach_intervals(statistics, intervals))
    }
}
