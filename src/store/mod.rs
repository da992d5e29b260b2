pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{Transaction, User, UserId};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username '{0}' already exists")]
    DuplicateUsername(String),
    #[error("user {0} does not exist")]
    UnknownOwner(UserId),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Inclusive date window. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

/// Durable home of users and their transactions.
///
/// Implementations must make `commit_batch` all-or-nothing: when it returns
/// an error no record of the batch is visible to later queries, and two
/// concurrent batches never interleave partial writes.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn commit_batch(&self, records: Vec<Transaction>) -> Result<(), StoreError>;

    /// Owner-scoped records inside `range`, ordered by date then creation.
    async fn query(&self, owner: UserId, range: DateRange) -> Result<Vec<Transaction>, StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, username: &str, credential: &str) -> Result<User, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = DateRange::new(Some(day(5)), Some(day(10)));
        assert!(!range.contains(day(4)));
        assert!(range.contains(day(5)));
        assert!(range.contains(day(10)));
        assert!(!range.contains(day(11)));
    }

    #[test]
    fn open_range_contains_everything() {
        let range = DateRange::default();
        assert!(range.contains(day(1)));
        assert!(range.contains(NaiveDate::MAX));

        let from = DateRange::new(Some(day(3)), None);
        assert!(from.contains(NaiveDate::MAX));
        assert!(!from.contains(day(2)));
    }
}
