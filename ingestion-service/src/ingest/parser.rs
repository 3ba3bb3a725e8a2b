//! CSV statement parsing.
//!
//! Lines that cannot be read are skipped and counted, never fatal. Only a
//! statement that yields no rows at all is rejected.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{EntryKind, StatementFormat};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("No valid transactions found in statement")]
    NoTransactionsFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub date: NaiveDate,
    pub description: String,
    /// Signed amount: debits negative, credits positive.
    pub amount: Decimal,
    pub kind: EntryKind,
    pub balance: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub rows: Vec<ParsedRow>,
    pub skipped: usize,
}

impl ParsedStatement {
    /// Last row of the file, the one whose balance reflects the account
    /// state at export time.
    pub fn latest(&self) -> Option<&ParsedRow> {
        self.rows.last()
    }
}

pub fn parse_statement(raw: &str, format: StatementFormat) -> Result<ParsedStatement, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let mut rows = Vec::new();
    let mut skipped = 0;
    let mut header_pending = format == StatementFormat::SignedAmount;

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable statement line");
                skipped += 1;
                continue;
            }
        };

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        if header_pending {
            header_pending = false;
            continue;
        }

        let fields: Vec<&str> = record.iter().collect();
        let row = match format {
            StatementFormat::DebitCredit => parse_debit_credit(&fields),
            StatementFormat::SignedAmount => parse_signed_amount(&fields),
        };

        match row {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }

    if rows.is_empty() {
        return Err(ParseError::NoTransactionsFound);
    }

    Ok(ParsedStatement { rows, skipped })
}

fn parse_debit_credit(fields: &[&str]) -> Option<ParsedRow> {
    if fields.len() < 4 {
        return None;
    }

    let date = normalize_date(fields[0])?;
    let description = fields[1].to_string();
    if description.is_empty() {
        return None;
    }

    let debit = parse_money(fields[2]).ok()?;
    let credit = parse_money(fields[3]).ok()?;
    let balance = fields
        .get(4)
        .and_then(|raw| parse_money(raw).ok().flatten());

    let (amount, kind) = match (debit, credit) {
        (Some(debit), _) if !debit.is_zero() => (-debit.abs(), EntryKind::Debit),
        (_, credit) => (credit.unwrap_or_default().abs(), EntryKind::Credit),
    };

    Some(ParsedRow {
        date,
        description,
        amount,
        kind,
        balance,
    })
}

fn parse_signed_amount(fields: &[&str]) -> Option<ParsedRow> {
    if fields.len() < 3 {
        return None;
    }

    let date = normalize_date(fields[0])?;
    let description = fields[1].to_string();
    if description.is_empty() {
        return None;
    }

    let amount = parse_money(fields[2]).ok()??;
    let kind = if amount.is_sign_negative() && !amount.is_zero() {
        EntryKind::Debit
    } else {
        EntryKind::Credit
    };

    Some(ParsedRow {
        date,
        description,
        amount,
        kind,
        balance: None,
    })
}

/// Accepts `MM/DD/YYYY` (single-digit month/day allowed) and `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let parts: Vec<&str> = if raw.contains('/') {
        raw.split('/').collect()
    } else {
        raw.split('-').collect()
    };
    if parts.len() != 3 {
        return None;
    }

    let (year, month, day) = if raw.contains('/') {
        (parts[2], parts[0], parts[1])
    } else {
        (parts[0], parts[1], parts[2])
    };
    if year.trim().len() != 4 {
        return None;
    }

    NaiveDate::from_ymd_opt(
        year.trim().parse().ok()?,
        month.trim().parse().ok()?,
        day.trim().parse().ok()?,
    )
}

/// Empty cell is `Ok(None)`. Currency symbols and thousands separators are
/// stripped before parsing.
fn parse_money(raw: &str) -> Result<Option<Decimal>, rust_decimal::Error> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(&cleaned).map(Some)
}
