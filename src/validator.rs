use std::{fmt, str::FromStr};

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;

use crate::models::TransactionType;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MAX_MEMO_CHARS: usize = 200;
const AMOUNT_SCALE: i64 = 2;
/// Longest amount text worth parsing; anything longer cannot fit the column.
const MAX_AMOUNT_CHARS: usize = 32;
/// Exclusive upper bound, matching the `NUMERIC(12, 2)` amount column.
pub const MAX_AMOUNT: i64 = 10_000_000_000;

/// One problem with one field of a candidate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    InvalidDate,
    InvalidType,
    InvalidAmount,
    NonPositiveAmount,
    AmountPrecision,
    AmountTooLarge,
    EmptyMemo,
    MemoTooLong,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FieldError::InvalidDate => "Invalid date format. Use YYYY-MM-DD",
            FieldError::InvalidType => "Type must be either 'Income' or 'Expense'",
            FieldError::InvalidAmount => "Invalid amount format",
            FieldError::NonPositiveAmount => "Amount must be positive",
            FieldError::AmountPrecision => "Amount must have at most two decimal places",
            FieldError::AmountTooLarge => "Amount must be less than 10000000000",
            FieldError::EmptyMemo => "Memo cannot be empty",
            FieldError::MemoTooLong => "Memo must be less than 200 characters",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub date: NaiveDate,
    pub kind: TransactionType,
    pub amount: BigDecimal,
    pub memo: String,
}

/// Checks every field of a candidate record and collects all problems.
///
/// Never stops at the first failing field: the returned list holds one entry
/// per failed check, in field order. A record is produced only when the list
/// would be empty.
pub fn validate(
    date: &str,
    kind: &str,
    amount: &str,
    memo: &str,
) -> Result<NormalizedRecord, Vec<FieldError>> {
    let mut errors = Vec::new();

    let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| errors.push(FieldError::InvalidDate))
        .ok();

    let kind = TransactionType::from_str(kind.trim())
        .map_err(|_| errors.push(FieldError::InvalidType))
        .ok();

    let amount = match parse_amount(amount) {
        Ok(amount) => Some(amount),
        Err(err) => {
            errors.push(err);
            None
        }
    };

    let memo = memo.trim();
    if memo.is_empty() {
        errors.push(FieldError::EmptyMemo);
    }
    if memo.chars().count() > MAX_MEMO_CHARS {
        errors.push(FieldError::MemoTooLong);
    }

    match (date, kind, amount) {
        (Some(date), Some(kind), Some(amount)) if errors.is_empty() => Ok(NormalizedRecord {
            date,
            kind,
            amount,
            memo: memo.to_string(),
        }),
        _ => Err(errors),
    }
}

/// Parses a currency amount such as `12.5`, `$12.50` or ` 12.50 ` into an
/// exact decimal with scale 2.
///
/// Exponent notation is refused before parsing: `1e200000` is a short string
/// but rescaling it would allocate hundreds of thousands of digits.
pub fn parse_amount(raw: &str) -> Result<BigDecimal, FieldError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();

    if digits.len() > MAX_AMOUNT_CHARS || digits.contains(|c: char| c == 'e' || c == 'E') {
        return Err(FieldError::InvalidAmount);
    }

    let amount = BigDecimal::from_str(digits).map_err(|_| FieldError::InvalidAmount)?;
    if amount <= BigDecimal::zero() {
        return Err(FieldError::NonPositiveAmount);
    }

    let (_, exponent) = amount.normalized().as_bigint_and_exponent();
    if exponent > AMOUNT_SCALE {
        return Err(FieldError::AmountPrecision);
    }

    if amount >= BigDecimal::from(MAX_AMOUNT) {
        return Err(FieldError::AmountTooLarge);
    }

    Ok(amount.with_scale(AMOUNT_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn accepts_and_normalizes_valid_record() {
        let record = validate(" 2024-01-01 ", " Income ", "$100", "  Salary  ").unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(record.kind, TransactionType::Income);
        assert_eq!(record.amount, dec("100.00"));
        assert_eq!(record.amount.to_string(), "100.00");
        assert_eq!(record.memo, "Salary");
    }

    #[rstest]
    #[case("10.00")]
    #[case("$10.00")]
    #[case(" 10.00 ")]
    #[case("$ 10")]
    #[case("10.0")]
    fn equivalent_amounts_normalize_identically(#[case] raw: &str) {
        let amount = parse_amount(raw).unwrap();
        assert_eq!(amount.to_string(), "10.00");
    }

    #[rstest]
    #[case("abc", FieldError::InvalidAmount)]
    #[case("", FieldError::InvalidAmount)]
    #[case("$", FieldError::InvalidAmount)]
    #[case("1,000.00", FieldError::InvalidAmount)]
    #[case("0", FieldError::NonPositiveAmount)]
    #[case("-5", FieldError::NonPositiveAmount)]
    #[case("$-0.01", FieldError::NonPositiveAmount)]
    #[case("1.005", FieldError::AmountPrecision)]
    #[case("1e2", FieldError::InvalidAmount)]
    #[case("1e200000", FieldError::InvalidAmount)]
    #[case("1E2000000", FieldError::InvalidAmount)]
    #[case("0.000000000000000000000000000000001", FieldError::InvalidAmount)]
    #[case("10000000000", FieldError::AmountTooLarge)]
    #[case("$99999999999999.99", FieldError::AmountTooLarge)]
    fn rejects_bad_amounts(#[case] raw: &str, #[case] expected: FieldError) {
        assert_eq!(parse_amount(raw), Err(expected));
    }

    #[test]
    fn largest_amount_fits_the_column() {
        assert_eq!(parse_amount("9999999999.99").unwrap().to_string(), "9999999999.99");
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        assert_eq!(parse_amount("1.500").unwrap().to_string(), "1.50");
    }

    #[rstest]
    #[case("2024/01/01")]
    #[case("01-02-2024")]
    #[case("2024-02-30")]
    #[case("yesterday")]
    fn rejects_bad_dates(#[case] raw: &str) {
        let errors = validate(raw, "Income", "1", "memo").unwrap_err();
        assert_eq!(errors, vec![FieldError::InvalidDate]);
    }

    #[rstest]
    #[case("income")]
    #[case("EXPENSE")]
    #[case("Transfer")]
    #[case("")]
    fn type_must_match_exactly(#[case] raw: &str) {
        let errors = validate("2024-01-01", raw, "1", "memo").unwrap_err();
        assert_eq!(errors, vec![FieldError::InvalidType]);
    }

    #[test]
    fn memo_rules() {
        let errors = validate("2024-01-01", "Expense", "1", "   ").unwrap_err();
        assert_eq!(errors, vec![FieldError::EmptyMemo]);

        let long = "x".repeat(MAX_MEMO_CHARS + 1);
        let errors = validate("2024-01-01", "Expense", "1", &long).unwrap_err();
        assert_eq!(errors, vec![FieldError::MemoTooLong]);

        let exact = "é".repeat(MAX_MEMO_CHARS);
        assert!(validate("2024-01-01", "Expense", "1", &exact).is_ok());
    }

    #[test]
    fn collects_every_field_error() {
        let errors = validate("bad", "Gift", "-3", "").unwrap_err();
        assert_eq!(
            errors,
            vec![
                FieldError::InvalidDate,
                FieldError::InvalidType,
                FieldError::NonPositiveAmount,
                FieldError::EmptyMemo,
            ]
        );
    }

    #[test]
    fn is_deterministic() {
        let first = validate("2024-03-04", "Expense", "$7.25", "Lunch");
        let second = validate("2024-03-04", "Expense", "$7.25", "Lunch");
        assert_eq!(first, second);

        let first = validate("x", "y", "z", "");
        let second = validate("x", "y", "z", "");
        assert_eq!(first, second);
    }
}
