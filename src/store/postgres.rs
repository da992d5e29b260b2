use async_trait::async_trait;
use sqlx::{
    types::{
        chrono::{DateTime, NaiveDate, Utc},
        BigDecimal, Uuid,
    },
    Pool, Postgres,
};

use super::{DateRange, StoreError, TransactionStore};
use crate::models::{Transaction, User, UserId};

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    date: NaiveDate,
    #[sqlx(rename = "type")]
    kind: String,
    amount: BigDecimal,
    memo: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse()
            .map_err(|err| StoreError::Corrupt(format!("transaction {}: {}", row.id, err)))?;
        Ok(Transaction {
            id: row.id,
            date: row.date,
            kind,
            amount: row.amount,
            memo: row.memo,
            created_at: row.created_at,
            owner: row.user_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            credential: row.password_hash,
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    p: Pool<Postgres>,
}

impl PgStore {
    pub fn new(p: Pool<Postgres>) -> Self {
        Self { p }
    }

    async fn insert_all(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        records: &[Transaction],
    ) -> Result<(), sqlx::Error> {
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO transactions (id, user_id, date, type, amount, memo, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(record.id)
            .bind(record.owner)
            .bind(record.date)
            .bind(record.kind.as_str())
            .bind(&record.amount)
            .bind(&record.memo)
            .bind(record.created_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn commit_batch(&self, records: Vec<Transaction>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.p.begin().await?;
        match Self::insert_all(&mut tx, &records).await {
            Ok(()) => {
                tx.commit().await?;
                log::debug!("committed {} transactions", records.len());
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::error!("rollback failed after insert error: {}", rollback_err);
                }
                if let Some(db_err) = err.as_database_error() {
                    if db_err.is_foreign_key_violation() {
                        let owner = records.first().map(|r| r.owner).unwrap_or_default();
                        return Err(StoreError::UnknownOwner(owner));
                    }
                }
                Err(err.into())
            }
        }
    }

    async fn query(&self, owner: UserId, range: DateRange) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, date, type, amount, memo, created_at
            FROM transactions
            WHERE
                user_id = $1 AND
                ($2::date IS NULL OR date >= $2) AND
                ($3::date IS NULL OR date <= $3)
            ORDER BY date, created_at, id
            "#,
        )
        .bind(owner)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.p)
        .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash FROM users WHERE username = $1 LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.p)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create_user(&self, username: &str, credential: &str) -> Result<User, StoreError> {
        let res = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, username, password_hash
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(credential)
        .fetch_one(&self.p)
        .await;

        match res {
            Ok(row) => Ok(row.into()),
            Err(err) => {
                if let Some(db_err) = err.as_database_error() {
                    if db_err.is_unique_violation() {
                        log::warn!("cannot register user: username '{}' is taken", username);
                        return Err(StoreError::DuplicateUsername(username.to_string()));
                    }
                }
                Err(err.into())
            }
        }
    }
}

/// These run against a real server: point `TEST_DATABASE_URL` at a scratch
/// database and use `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use std::{path::Path, str::FromStr};

    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::{migration, models::TransactionType};

    static MIGRATE: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    async fn store() -> PgStore {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL is not set");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        let _guard = MIGRATE.lock().await;
        migration::migrate(&pool, &Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
            .await
            .unwrap();
        PgStore::new(pool)
    }

    async fn fresh_user(store: &PgStore) -> User {
        let name = format!("user-{}", Uuid::new_v4());
        store.create_user(&name, "credential").await.unwrap()
    }

    fn record(owner: UserId, date: &str, amount: &str) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            date: NaiveDate::from_str(date).unwrap(),
            kind: TransactionType::Income,
            amount: BigDecimal::from_str(amount).unwrap(),
            memo: "test".to_string(),
            created_at: Utc::now(),
            owner,
        }
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn date_bounds_are_inclusive() {
        let store = store().await;
        let alice = fresh_user(&store).await;
        let bob = fresh_user(&store).await;

        store
            .commit_batch(vec![
                record(alice.id, "2023-12-31", "1.00"),
                record(alice.id, "2024-01-01", "2.00"),
                record(alice.id, "2024-01-31", "9999999999.99"),
                record(alice.id, "2024-02-01", "4.00"),
                record(bob.id, "2024-01-15", "5.00"),
            ])
            .await
            .unwrap();

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1),
            NaiveDate::from_ymd_opt(2024, 1, 31),
        );
        let windowed = store.query(alice.id, range).await.unwrap();
        let dates: Vec<String> = windowed.iter().map(|t| t.date.to_string()).collect();
        assert_eq!(dates, ["2024-01-01", "2024-01-31"]);
        assert_eq!(windowed[1].amount.to_string(), "9999999999.99");
        assert!(windowed.iter().all(|t| t.owner == alice.id));

        let from = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 31), None);
        assert_eq!(store.query(alice.id, from).await.unwrap().len(), 2);
        assert_eq!(store.query(alice.id, DateRange::default()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn unknown_owner_rolls_back_batch() {
        let store = store().await;
        let alice = fresh_user(&store).await;
        let ghost = Uuid::new_v4();

        let err = store
            .commit_batch(vec![
                record(alice.id, "2024-01-01", "1.00"),
                record(ghost, "2024-01-02", "2.00"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownOwner(_)));

        assert!(store.query(alice.id, DateRange::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn duplicate_username_is_reported() {
        let store = store().await;
        let alice = fresh_user(&store).await;

        let err = store.create_user(&alice.username, "other").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(name) if name == alice.username));

        let found = store.find_user(&alice.username).await.unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert_eq!(found.credential, "credential");
    }
}
