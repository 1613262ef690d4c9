//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tab_tracker_core::domain::{
    attach_intervals, page_offset, AuthToken, IntervalFilter, NewTimeInterval, Page, Statistics,
    StatisticsWithIntervals, TimeInterval, User, UserCredentials, PAGE_SIZE,
};
use tab_tracker_core::ingest::{self, IngestSummary, IntervalKey, StatisticsDelta};
use tab_tracker_core::ports::{DatabaseService, PortError, PortResult};
use tracing::debug;
use uuid::Uuid;

/// Rows per `INSERT` statement; keeps bind parameters under the protocol limit.
const INSERT_CHUNK: usize = 1000;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    password_hash: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            username: self.username,
            hashed_password: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct TokenRecord {
    key: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}
impl TokenRecord {
    fn to_domain(self) -> AuthToken {
        AuthToken {
            key: self.key,
            user_id: self.user_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct IntervalRecord {
    id: i64,
    user_id: Uuid,
    url: String,
    favicon_url: Option<String>,
    start_time: i64,
    end_time: i64,
    date: NaiveDate,
    host: String,
}
impl IntervalRecord {
    fn to_domain(self) -> TimeInterval {
        TimeInterval {
            id: self.id,
            user_id: self.user_id,
            url: self.url,
            favicon_url: self.favicon_url,
            start_time: self.start_time,
            end_time: self.end_time,
            date: self.date,
            host: self.host,
        }
    }
}

#[derive(FromRow)]
struct StatisticsRecord {
    id: i64,
    user_id: Uuid,
    url: String,
    favicon_url: Option<String>,
    session_count: i64,
    time_count: i64,
    period_date: NaiveDate,
}
impl StatisticsRecord {
    fn to_domain(self) -> Statistics {
        Statistics {
            id: self.id,
            user_id: self.user_id,
            url: self.url,
            favicon_url: self.favicon_url,
            session_count: self.session_count,
            time_count: self.time_count,
            period_date: self.period_date,
        }
    }
}

const INTERVAL_COLUMNS: &str = "id, user_id, url, favicon_url, start_time, end_time, date, host";

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &IntervalFilter) {
    if let Some(date) = filter.date {
        query.push(" AND date = ").push_bind(date);
    }
    if let Some(start_time) = filter.start_time {
        query.push(" AND start_time = ").push_bind(start_time);
    }
    if let Some(end_time) = filter.end_time {
        query.push(" AND end_time = ").push_bind(end_time);
    }
}

//=========================================================================================
// Ingestion Steps (all run on the caller's transaction)
//=========================================================================================

/// Keys of stored intervals sharing a (url, date) pair with the batch.
async fn existing_keys(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    batch: &[NewTimeInterval],
) -> Result<HashSet<IntervalKey>, sqlx::Error> {
    if batch.is_empty() {
        return Ok(HashSet::new());
    }
    let (urls, dates): (Vec<String>, Vec<NaiveDate>) =
        ingest::lookup_pairs(batch).into_iter().unzip();

    let rows: Vec<(String, NaiveDate, i64, i64)> = sqlx::query_as(
        "SELECT t.url, t.date, t.start_time, t.end_time \
         FROM time_intervals t \
         JOIN UNNEST($2::varchar[], $3::date[]) AS k(url, date) \
           ON t.url = k.url AND t.date = k.date \
         WHERE t.user_id = $1",
    )
    .bind(user_id)
    .bind(urls)
    .bind(dates)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Creates or increments one statistics row. The increment happens in the
/// database so concurrent batches for the same key cannot lose updates.
async fn apply_delta(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    delta: &StatisticsDelta,
) -> Result<(), sqlx::Error> {
    let favicon_url = match &delta.favicon_url {
        Some(favicon) => Some(favicon.clone()),
        None => {
            sqlx::query_scalar::<_, String>(
                "SELECT favicon_url FROM statistics \
                 WHERE user_id = $1 AND url = $2 AND favicon_url IS NOT NULL \
                 LIMIT 1",
            )
            .bind(user_id)
            .bind(delta.url.as_str())
            .fetch_optional(&mut **tx)
            .await?
        }
    };

    sqlx::query(
        "INSERT INTO statistics \
           (user_id, url, favicon_url, session_count, time_count, period_date) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (user_id, url, period_date) DO UPDATE SET \
           session_count = statistics.session_count + EXCLUDED.session_count, \
           time_count = statistics.time_count + EXCLUDED.time_count, \
           favicon_url = COALESCE(statistics.favicon_url, EXCLUDED.favicon_url)",
    )
    .bind(user_id)
    .bind(delta.url.as_str())
    .bind(favicon_url)
    .bind(delta.session_count)
    .bind(delta.time_count)
    .bind(delta.period_date)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_intervals(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    fresh: &[NewTimeInterval],
) -> Result<(), sqlx::Error> {
    for chunk in fresh.chunks(INSERT_CHUNK) {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO time_intervals \
             (user_id, url, favicon_url, start_time, end_time, date, host) ",
        );
        query.push_values(chunk, |mut row, interval| {
            row.push_bind(user_id)
                .push_bind(interval.url.clone())
                .push_bind(interval.favicon_url.clone())
                .push_bind(interval.start_time)
                .push_bind(interval.end_time)
                .push_bind(interval.date)
                .push_bind(interval.host.clone());
        });
        query.build().execute(&mut **tx).await?;
    }
    Ok(())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3) \
             RETURNING id, username, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("A user named '{}' already exists", username))
            }
            other => unexpected(other),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", username)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_or_create_token(&self, user_id: Uuid) -> PortResult<AuthToken> {
        sqlx::query(
            "INSERT INTO auth_tokens (key, user_id) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(AuthToken::generate_key())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        let record = sqlx::query_as::<_, TokenRecord>(
            "SELECT key, user_id, created_at FROM auth_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn user_for_token(&self, key: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM auth_tokens WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or(PortError::Unauthorized)
    }

    async fn ingest_intervals(
        &self,
        user_id: Uuid,
        batch: Vec<NewTimeInterval>,
    ) -> PortResult<IngestSummary> {
        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let existing = existing_keys(&mut tx, user_id, &batch)
            .await
            .map_err(unexpected)?;
        let plan = ingest::plan(batch, &existing);

        for delta in &plan.deltas {
            apply_delta(&mut tx, user_id, delta)
                .await
                .map_err(unexpected)?;
        }
        insert_intervals(&mut tx, user_id, &plan.fresh)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;

        debug!(
            "Stored {} intervals and {} statistics updates for user {}",
            plan.fresh.len(),
            plan.deltas.len(),
            user_id
        );
        Ok(plan.summary())
    }

    async fn list_intervals(
        &self,
        user_id: Uuid,
        filter: &IntervalFilter,
        page: u32,
    ) -> PortResult<Page<TimeInterval>> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM time_intervals WHERE user_id = ");
        count.push_bind(user_id);
        push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        let total = total.max(0) as u64;

        let offset = page_offset(page, PAGE_SIZE, total)
            .ok_or_else(|| PortError::NotFound("Invalid page.".to_string()))?;

        let mut select: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM time_intervals WHERE user_id = ",
            INTERVAL_COLUMNS
        ));
        select.push_bind(user_id);
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY date DESC, start_time ASC, id ASC LIMIT ")
            .push_bind(i64::from(PAGE_SIZE))
            .push(" OFFSET ")
            .push_bind(offset as i64);

        let records = select
            .build_query_as::<IntervalRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(Page {
            items: records.into_iter().map(|r| r.to_domain()).collect(),
            total,
            page,
            page_size: PAGE_SIZE,
        })
    }

    async fn get_interval(&self, user_id: Uuid, interval_id: i64) -> PortResult<TimeInterval> {
        let record = sqlx::query_as::<_, IntervalRecord>(&format!(
            "SELECT {} FROM time_intervals WHERE id = $1 AND user_id = $2",
            INTERVAL_COLUMNS
        ))
        .bind(interval_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Interval {} not found", interval_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn statistics_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<StatisticsWithIntervals>> {
        let statistics: Vec<Statistics> = sqlx::query_as::<_, StatisticsRecord>(
            "SELECT id, user_id, url, favicon_url, session_count, time_count, period_date \
             FROM statistics \
             WHERE user_id = $1 AND period_date BETWEEN $2 AND $3 \
             ORDER BY time_count DESC, id ASC",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(|r| r.to_domain())
        .collect();

        if statistics.is_empty() {
            return Ok(Vec::new());
        }

        let hosts: Vec<String> = statistics
            .iter()
            .map(|s| s.url.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let intervals: Vec<TimeInterval> = sqlx::query_as::<_, IntervalRecord>(&format!(
            "SELECT {} FROM time_intervals \
             WHERE user_id = $1 AND date BETWEEN $2 AND $3 AND host = ANY($4) \
             ORDER BY date DESC, start_time ASC, id ASC",
            INTERVAL_COLUMNS
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .bind(hosts)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(|r| r.to_domain())
        .collect();

        Ok(attach_intervals(statistics, intervals))
    }
}
