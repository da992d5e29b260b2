use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{Transaction, UserId},
    store::{StoreError, TransactionStore},
    validator,
};

const FIELDS_PER_RECORD: usize = 4;
const COMMENT_MARKER: char = '#';

/// Outcome of one ingestion call: how many records were persisted and one
/// message per rejected line, in payload order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub added_count: usize,
    pub errors: Vec<String>,
}

/// The staged records could not be persisted. Nothing from the batch was
/// written; `report.added_count` is zero and the line errors are kept.
#[derive(Debug, Error)]
#[error("batch commit failed: {source}")]
pub struct BatchError {
    pub report: BatchReport,
    #[source]
    pub source: StoreError,
}

enum LineOutcome {
    Skipped,
    Staged(Transaction),
    Rejected(String),
}

#[derive(Clone)]
pub struct BatchIngestor {
    store: Arc<dyn TransactionStore>,
    delimiter: u8,
}

impl BatchIngestor {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Validates every line of `payload` independently, then persists the
    /// valid ones for `owner` in a single atomic commit.
    pub async fn ingest(&self, payload: &[u8], owner: UserId) -> Result<BatchReport, BatchError> {
        let (staged, errors) = self.stage(payload, owner);
        let added_count = staged.len();

        match self.store.commit_batch(staged).await {
            Ok(()) => {
                log::debug!(
                    "user {}: {} transactions added, {} lines rejected",
                    owner,
                    added_count,
                    errors.len()
                );
                Ok(BatchReport {
                    added_count,
                    errors,
                })
            }
            Err(source) => {
                log::error!("database error while committing batch for user {}: {}", owner, source);
                Err(BatchError {
                    report: BatchReport {
                        added_count: 0,
                        errors,
                    },
                    source,
                })
            }
        }
    }

    /// Parses and validates without touching the store.
    fn stage(&self, payload: &[u8], owner: UserId) -> (Vec<Transaction>, Vec<String>) {
        let mut staged = Vec::new();
        let mut errors = Vec::new();

        for (idx, raw) in payload.split(|b| *b == b'\n').enumerate() {
            let line = idx + 1;
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

            match self.process_line(raw, owner) {
                Ok(LineOutcome::Skipped) => {}
                Ok(LineOutcome::Staged(transaction)) => staged.push(transaction),
                Ok(LineOutcome::Rejected(reason)) => errors.push(format!("Line {}: {}", line, reason)),
                Err(err) => {
                    log::error!("error processing line {}: {:#}", line, err);
                    errors.push(format!("Line {}: Unknown error occurred", line));
                }
            }
        }

        (staged, errors)
    }

    fn process_line(&self, raw: &[u8], owner: UserId) -> anyhow::Result<LineOutcome> {
        let text = std::str::from_utf8(raw).context("line is not valid utf-8")?;
        if text.trim().is_empty() {
            return Ok(LineOutcome::Skipped);
        }

        let record = self.split_fields(text)?;
        let first = record.get(0).unwrap_or_default();
        if first.starts_with(COMMENT_MARKER) {
            return Ok(LineOutcome::Skipped);
        }

        if record.len() != FIELDS_PER_RECORD {
            return Ok(LineOutcome::Rejected("Invalid number of fields".to_string()));
        }

        let field = |i: usize| record.get(i).unwrap_or_default().trim();
        let outcome = match validator::validate(field(0), field(1), field(2), field(3)) {
            Ok(normalized) => LineOutcome::Staged(Transaction {
                id: Uuid::new_v4(),
                date: normalized.date,
                kind: normalized.kind,
                amount: normalized.amount,
                memo: normalized.memo,
                created_at: Utc::now(),
                owner,
            }),
            Err(field_errors) => LineOutcome::Rejected(
                field_errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        };
        Ok(outcome)
    }

    /// Splits one line into fields, honoring quotes.
    fn split_fields(&self, text: &str) -> anyhow::Result<csv::StringRecord> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(text.as_bytes());

        let mut record = csv::StringRecord::new();
        rdr.read_record(&mut record)
            .context("cannot split line into fields")?;
        Ok(record)
    }
}
