//! crates/tab_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific storage implementations.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{
    AuthToken, IntervalFilter, NewTimeInterval, Page, StatisticsWithIntervals, TimeInterval, User,
    UserCredentials,
};
use crate::ingest::IngestSummary;
use crate::validation::ValidationError;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., the database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials>;

    // --- Token Auth ---
    /// Returns the user's token, creating one on first use.
    async fn get_or_create_token(&self, user_id: Uuid) -> PortResult<AuthToken>;

    /// Resolves a token key to its owner, or `Unauthorized`.
    async fn user_for_token(&self, key: &str) -> PortResult<Uuid>;

    // --- Intervals ---
    /// Stores a validated batch and updates statistics, all or nothing.
    async fn ingest_intervals(
        &self,
        user_id: Uuid,
        batch: Vec<NewTimeInterval>,
    ) -> PortResult<IngestSummary>;

    async fn list_intervals(
        &self,
        user_id: Uuid,
        filter: &IntervalFilter,
        page: u32,
    ) -> PortResult<Page<TimeInterval>>;

    async fn get_interval(&self, user_id: Uuid, interval_id: i64) -> PortResult<TimeInterval>;

    // --- Statistics ---
    /// Rows with `start <= period_date <= end`, by time_count descending.
    async fn statistics_in_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<StatisticsWithIntervals>>;
}
