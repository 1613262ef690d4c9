pub mod domain;
pub mod duration;
pub mod ingest;
pub mod ports;
pub mod validation;

pub use domain::{
    AuthToken, IntervalFilter, NewTimeInterval, Page, Statistics, StatisticsWithIntervals,
    TimeInterval, User, UserCredentials,
};
pub use ingest::{IngestPlan, IngestSummary, IntervalDraft, StatisticsDelta};
pub use ports::{DatabaseService, PortError, PortResult};
pub use validation::ValidationError;
