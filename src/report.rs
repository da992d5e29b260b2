use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::{
    models::{Transaction, TransactionType, UserId},
    store::{DateRange, StoreError, TransactionStore},
    validator::DATE_FORMAT,
};

const REPORT_SCALE: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateRangeError {
    #[error("Invalid start_date format")]
    InvalidStart,
    #[error("Invalid end_date format")]
    InvalidEnd,
}

impl DateRange {
    /// Builds a range from optional `YYYY-MM-DD` query values. Missing or
    /// empty values leave that side open.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, DateRangeError> {
        let start = parse_bound(start).map_err(|_| DateRangeError::InvalidStart)?;
        let end = parse_bound(end).map_err(|_| DateRangeError::InvalidEnd)?;
        Ok(DateRange::new(start, end))
    }
}

fn parse_bound(raw: Option<&str>) -> Result<Option<NaiveDate>, chrono::ParseError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, DATE_FORMAT).map(Some),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    #[serde(rename = "gross-revenue")]
    pub gross_revenue: BigDecimal,
    pub expenses: BigDecimal,
    #[serde(rename = "net-revenue")]
    pub net_revenue: BigDecimal,
    #[serde(rename = "transaction_count")]
    pub count: usize,
}

impl Report {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut gross_revenue = BigDecimal::default();
        let mut expenses = BigDecimal::default();

        for t in transactions {
            match t.kind {
                TransactionType::Income => gross_revenue += &t.amount,
                TransactionType::Expense => expenses += &t.amount,
            }
        }

        let net_revenue = &gross_revenue - &expenses;
        Report {
            gross_revenue: gross_revenue.with_scale(REPORT_SCALE),
            expenses: expenses.with_scale(REPORT_SCALE),
            net_revenue: net_revenue.with_scale(REPORT_SCALE),
            count: transactions.len(),
        }
    }
}

#[derive(Clone)]
pub struct ReportAggregator {
    store: Arc<dyn TransactionStore>,
}

impl ReportAggregator {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    pub async fn report(&self, owner: UserId, range: DateRange) -> Result<Report, StoreError> {
        let transactions = self.store.query(owner, range).await?;
        Ok(Report::from_transactions(&transactions))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;
    use crate::store::MemoryStore;

    fn tx(owner: UserId, date: &str, kind: TransactionType, amount: &str) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            date: NaiveDate::from_str(date).unwrap(),
            kind,
            amount: BigDecimal::from_str(amount).unwrap(),
            memo: "m".to_string(),
            created_at: Utc::now(),
            owner,
        }
    }

    #[test]
    fn empty_set_is_all_zero() {
        let report = Report::from_transactions(&[]);
        assert_eq!(report.count, 0);
        assert_eq!(report.gross_revenue.to_string(), "0.00");
        assert_eq!(report.expenses.to_string(), "0.00");
        assert_eq!(report.net_revenue.to_string(), "0.00");
    }

    #[test]
    fn sums_are_exact() {
        let owner = Uuid::new_v4();
        let mut transactions = Vec::new();
        for _ in 0..10 {
            transactions.push(tx(owner, "2024-01-01", TransactionType::Income, "0.10"));
        }
        transactions.push(tx(owner, "2024-01-01", TransactionType::Expense, "0.20"));
        transactions.push(tx(owner, "2024-01-01", TransactionType::Expense, "0.01"));

        let report = Report::from_transactions(&transactions);
        assert_eq!(report.gross_revenue.to_string(), "1.00");
        assert_eq!(report.expenses.to_string(), "0.21");
        assert_eq!(report.net_revenue.to_string(), "0.79");
        assert_eq!(&report.gross_revenue - &report.expenses, report.net_revenue);
        assert_eq!(report.count, 12);
    }

    #[test]
    fn net_revenue_may_be_negative() {
        let owner = Uuid::new_v4();
        let report = Report::from_transactions(&[
            tx(owner, "2024-01-01", TransactionType::Income, "5.00"),
            tx(owner, "2024-01-02", TransactionType::Expense, "7.50"),
        ]);
        assert_eq!(report.net_revenue.to_string(), "-2.50");
    }

    #[test]
    fn serializes_with_exact_amount_strings() {
        let owner = Uuid::new_v4();
        let report = Report::from_transactions(&[tx(owner, "2024-01-01", TransactionType::Income, "100.00")]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["gross-revenue"], "100.00");
        assert_eq!(json["net-revenue"], "100.00");
        assert_eq!(json["expenses"], "0.00");
        assert_eq!(json["transaction_count"], 1);
    }

    #[rstest]
    #[case(None, None, DateRange::default())]
    #[case(Some(""), Some("  "), DateRange::default())]
    #[case(Some("2024-01-01"), None, DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1), None))]
    #[case(None, Some("2024-12-31"), DateRange::new(None, NaiveDate::from_ymd_opt(2024, 12, 31)))]
    fn parses_optional_bounds(
        #[case] start: Option<&str>,
        #[case] end: Option<&str>,
        #[case] expected: DateRange,
    ) {
        assert_eq!(DateRange::parse(start, end), Ok(expected));
    }

    #[test]
    fn rejects_malformed_bounds() {
        assert_eq!(
            DateRange::parse(Some("01/02/2024"), None),
            Err(DateRangeError::InvalidStart)
        );
        assert_eq!(
            DateRange::parse(Some("2024-01-01"), Some("tomorrow")),
            Err(DateRangeError::InvalidEnd)
        );
    }

    #[tokio::test]
    async fn report_is_scoped_and_inclusive() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.create_user("alice", "h").await.unwrap().id;
        let bob = store.create_user("bob", "h").await.unwrap().id;
        store
            .commit_batch(vec![
                tx(alice, "2024-01-01", TransactionType::Income, "100.00"),
                tx(alice, "2024-01-15", TransactionType::Expense, "40.00"),
                tx(alice, "2024-01-31", TransactionType::Expense, "10.00"),
                tx(alice, "2024-02-01", TransactionType::Income, "999.00"),
                tx(bob, "2024-01-10", TransactionType::Income, "500.00"),
            ])
            .await
            .unwrap();

        let aggregator = ReportAggregator::new(store);
        let january = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        let report = aggregator.report(alice, january).await.unwrap();

        assert_eq!(report.gross_revenue.to_string(), "100.00");
        assert_eq!(report.expenses.to_string(), "50.00");
        assert_eq!(report.net_revenue.to_string(), "50.00");
        assert_eq!(report.count, 3);
    }
}
