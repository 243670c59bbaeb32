use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One decoded spreadsheet row, cells in header order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawImportRow {
    pub row_number: u32,
    pub cells: Vec<(String, String)>,
}

impl RawImportRow {
    pub fn new<K, V>(row_number: u32, cells: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            row_number,
            cells: cells.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingField {
    AccountCode,
    Amount,
}

impl MissingField {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::AccountCode => "accountCode",
            Self::Amount => "amount",
        }
    }
}

/// A normalized transaction line. Amounts are signed minor units: debit positive, credit negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRecord {
    #[serde(rename = "originalRowNumber")]
    pub original_row: u32,
    pub account_code: Option<String>,
    pub amount_cents: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    pub dimensions: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<MissingField>,
}

// ---------------------------------------------------------------------------
// Groups, errors, suggestions
// ---------------------------------------------------------------------------

/// Why a group was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Boundary {
    ZeroBalance,
    GroupKey,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    MissingField,
    InvalidAccount,
    InvalidDimensionName,
    UnbalancedGroup,
    InvalidStructure,
    Timeout,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidAccount => "INVALID_ACCOUNT",
            Self::InvalidDimensionName => "INVALID_DIMENSION_NAME",
            Self::UnbalancedGroup => "UNBALANCED_GROUP",
            Self::InvalidStructure => "INVALID_STRUCTURE",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    pub original_row: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

impl ValidationError {
    pub fn new(error_type: ErrorType, original_row: u32, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            original_row,
            field_name: None,
        }
    }

    pub fn on_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionType {
    Suggestion,
    Anomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    ChangeAccount,
    AddDimensionTag,
    CreateDimensionValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub message: String,
    pub confidence: f64,
    pub original_row: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SuggestionAction>,
}

/// A candidate journal entry: a contiguous run of lines from the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryGroup {
    pub group_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    pub boundary: Boundary,
    pub lines: Vec<LineRecord>,
    pub balance_cents: i64,
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub ai_suggestions: Vec<Suggestion>,
}

impl EntryGroup {
    pub fn new(
        group_index: usize,
        group_key: Option<String>,
        boundary: Boundary,
        lines: Vec<LineRecord>,
    ) -> Self {
        let total: i128 = lines.iter().map(|l| i128::from(l.amount_cents)).sum();
        // an unrepresentable total is still out of balance
        let balance_cents = i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX });
        Self {
            group_index,
            group_key,
            boundary,
            lines,
            balance_cents,
            is_valid: false,
            errors: Vec::new(),
            ai_suggestions: Vec::new(),
        }
    }

    pub fn first_row(&self) -> u32 {
        self.lines.first().map(|l| l.original_row).unwrap_or(0)
    }

    pub fn last_row(&self) -> u32 {
        self.lines.last().map(|l| l.original_row).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub entries_with_errors: usize,
    pub new_dimension_values: usize,
    pub total_suggestions: usize,
    pub total_anomalies: usize,
}

/// A (dimension, value) pair proposed for creation, with every row that proposed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDimensionValue {
    pub dimension: String,
    pub value: String,
    pub rows: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnalysisResult {
    pub batch_summary: BatchSummary,
    pub entry_groups: Vec<EntryGroup>,
    pub new_dimension_value_suggestions: Vec<NewDimensionValue>,
    pub input_checksum: String,
    pub timed_out: bool,
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub account_type: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionValue {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionDefinition {
    pub name: String,
    #[serde(default)]
    pub values: Vec<DimensionValue>,
}

/// Historical mean and standard deviation of absolute line amounts, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountBaseline {
    pub mean_cents: f64,
    pub stddev_cents: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Contains,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "contains" => Some(Self::Contains),
            "starts_with" => Some(Self::StartsWith),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }
}

/// Vocabulary rule mapping description text to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRule {
    pub pattern: String,
    pub match_type: MatchType,
    pub account_code: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub priority: i64,
}
