use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::models::{LineRecord, MissingField, RawImportRow};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Largest accepted line magnitude in minor units. Leaves headroom for summing
/// over a million lines without leaving `i64`.
pub const MAX_AMOUNT_CENTS: i64 = i64::MAX >> 20;

/// Parse spreadsheet amount text into signed minor units.
///
/// Accepts thousands separators, quotes, a `$` sign and accounting-style
/// parentheses for negatives. Blank, unparsable or out-of-range text yields `None`.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let value = if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        -inner.trim().parse::<f64>().ok()?
    } else {
        s.parse::<f64>().ok()?
    };
    let cents = (value * 100.0).round();
    if !cents.is_finite() || cents.abs() > MAX_AMOUNT_CENTS as f64 {
        return None;
    }
    Some(cents as i64)
}

/// Parse `M/D/YYYY` or `YYYY-MM-DD` into `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(y, m, d).map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn canonical_header(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Header classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownField {
    AccountCode,
    Amount,
    Debit,
    Credit,
    Description,
    Date,
    GroupKey,
}

/// What a spreadsheet column means. Decided once per header, never re-parsed downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Known(KnownField),
    Dimension(String),
}

const ALIASES: &[(KnownField, &[&str])] = &[
    (
        KnownField::AccountCode,
        &["account", "account code", "accountcode", "account number", "acct", "gl account", "gl code", "code"],
    ),
    (KnownField::Amount, &["amount", "net amount", "value"]),
    (KnownField::Debit, &["debit", "dr", "debit amount"]),
    (KnownField::Credit, &["credit", "cr", "credit amount"]),
    (KnownField::Description, &["description", "memo", "narrative", "details", "payee"]),
    (KnownField::Date, &["date", "posting date", "transaction date", "entry date"]),
];

/// Classify a header. Blank headers carry no meaning and return `None`.
pub fn classify_header(header: &str, group_key_column: Option<&str>) -> Option<ColumnRole> {
    let canonical = canonical_header(header);
    if canonical.is_empty() {
        return None;
    }
    if let Some(key_col) = group_key_column {
        if canonical_header(key_col) == canonical {
            return Some(ColumnRole::Known(KnownField::GroupKey));
        }
    }
    for (field, aliases) in ALIASES {
        if aliases.contains(&canonical.as_str()) {
            return Some(ColumnRole::Known(*field));
        }
    }
    Some(ColumnRole::Dimension(header.trim().to_string()))
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

pub struct Normalizer<'a> {
    group_key_column: Option<&'a str>,
    roles: HashMap<String, Option<ColumnRole>>,
}

impl<'a> Normalizer<'a> {
    pub fn new(group_key_column: Option<&'a str>) -> Self {
        Self {
            group_key_column,
            roles: HashMap::new(),
        }
    }

    fn role(&mut self, header: &str) -> Option<ColumnRole> {
        if let Some(role) = self.roles.get(header) {
            return role.clone();
        }
        let role = classify_header(header, self.group_key_column);
        debug!(header, ?role, "classified column");
        self.roles.insert(header.to_string(), role.clone());
        role
    }

    /// Normalize one row. Wholly blank rows return `None`.
    pub fn normalize_row(&mut self, row: &RawImportRow) -> Option<LineRecord> {
        if row.is_blank() {
            return None;
        }

        let mut account_code = None;
        let mut amount_raw: Option<&str> = None;
        let mut debit_raw: Option<&str> = None;
        let mut credit_raw: Option<&str> = None;
        let mut descriptions: Vec<&str> = Vec::new();
        let mut date = None;
        let mut group_key = None;
        let mut dimensions = BTreeMap::new();

        for (header, value) in &row.cells {
            let Some(role) = self.role(header) else {
                continue;
            };
            let value = value.trim();
            match role {
                ColumnRole::Known(KnownField::AccountCode) => {
                    if !value.is_empty() {
                        account_code = Some(value.to_string());
                    }
                }
                ColumnRole::Known(KnownField::Amount) => amount_raw = Some(value),
                ColumnRole::Known(KnownField::Debit) => debit_raw = Some(value),
                ColumnRole::Known(KnownField::Credit) => credit_raw = Some(value),
                ColumnRole::Known(KnownField::Description) => {
                    if !value.is_empty() {
                        descriptions.push(value);
                    }
                }
                ColumnRole::Known(KnownField::Date) => {
                    if !value.is_empty() {
                        date = parse_date(value);
                    }
                }
                ColumnRole::Known(KnownField::GroupKey) => {
                    if !value.is_empty() {
                        group_key = Some(value.to_string());
                    }
                }
                ColumnRole::Dimension(name) => {
                    if !value.is_empty() {
                        dimensions.insert(name, value.to_string());
                    }
                }
            }
        }

        let amount = match amount_raw.filter(|v| !v.is_empty()) {
            Some(raw) => parse_amount(raw),
            None => combine_debit_credit(debit_raw, credit_raw),
        };

        let mut missing_fields = Vec::new();
        if account_code.is_none() {
            missing_fields.push(MissingField::AccountCode);
        }
        if amount.is_none() {
            missing_fields.push(MissingField::Amount);
        }

        Some(LineRecord {
            original_row: row.row_number,
            account_code,
            amount_cents: amount.unwrap_or(0),
            description: descriptions.join(" "),
            date,
            group_key,
            dimensions,
            missing_fields,
        })
    }
}

/// Combine separate debit/credit columns into one signed amount. Credits are taken as magnitudes.
fn combine_debit_credit(debit: Option<&str>, credit: Option<&str>) -> Option<i64> {
    let debit = debit.filter(|v| !v.is_empty());
    let credit = credit.filter(|v| !v.is_empty());
    if debit.is_none() && credit.is_none() {
        return None;
    }
    let d = match debit {
        Some(raw) => parse_amount(raw)?.abs(),
        None => 0,
    };
    let c = match credit {
        Some(raw) => parse_amount(raw)?.abs(),
        None => 0,
    };
    Some(d - c)
}

/// Normalize a whole batch, preserving order. Only wholly blank rows are dropped.
pub fn normalize_rows(rows: &[RawImportRow], group_key_column: Option<&str>) -> Vec<LineRecord> {
    let mut normalizer = Normalizer::new(group_key_column);
    let lines: Vec<LineRecord> = rows.iter().filter_map(|r| normalizer.normalize_row(r)).collect();
    debug!(rows = rows.len(), lines = lines.len(), "normalized batch");
    lines
}
