use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{DateRange, StoreError, TransactionStore};
use crate::models::{Transaction, User, UserId};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    transactions: Vec<Transaction>,
}

/// Process-local store used when no database is configured, and by tests.
///
/// Every operation runs under one lock, which is what makes a batch commit
/// atomic here.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // a panic while holding the guard cannot leave a half-applied batch,
        // so the data is still consistent
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn commit_batch(&self, records: Vec<Transaction>) -> Result<(), StoreError> {
        let mut tables = self.lock();

        for record in &records {
            if !tables.users.iter().any(|u| u.id == record.owner) {
                return Err(StoreError::UnknownOwner(record.owner));
            }
        }

        tables.transactions.extend(records);
        Ok(())
    }

    async fn query(&self, owner: UserId, range: DateRange) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.lock();
        let mut found: Vec<Transaction> = tables
            .transactions
            .iter()
            .filter(|t| t.owner == owner && range.contains(t.date))
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.date, a.created_at, a.id).cmp(&(b.date, b.created_at, b.id)));
        Ok(found)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, username: &str, credential: &str) -> Result<User, StoreError> {
        let mut tables = self.lock();
        if tables.users.iter().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            credential: credential.to_string(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }
}
