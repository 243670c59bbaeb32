//! Read-only reference data the pipeline validates against.
//!
//! The chart of accounts, dimension vocabulary, amount baselines and the
//! categorization vocabulary are reached only through [`ReferenceData`].
//! Nothing here writes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{BatchError, Result};
use crate::models::{Account, AccountRule, AmountBaseline, DimensionDefinition, DimensionValue, MatchType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// The whole source is unreachable. Escalates to a batch failure.
    #[error("reference source unavailable: {0}")]
    Unavailable(String),
    /// A single lookup failed. Reported against the line that triggered it.
    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl From<ResolveError> for BatchError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Unavailable(msg) => BatchError::ReferenceUnavailable(msg),
            ResolveError::Lookup(msg) => BatchError::ReferenceLookup(msg),
        }
    }
}

pub type Resolved<T> = std::result::Result<T, ResolveError>;

pub trait ReferenceData: Send + Sync {
    /// Look up an account by code. `Ok(None)` means the code does not exist.
    fn resolve_account(&self, client_id: &str, code: &str) -> Resolved<Option<Account>>;

    fn list_dimensions(&self, client_id: &str) -> Resolved<Vec<DimensionDefinition>>;

    /// Whether `code` is an existing value of the named dimension.
    fn resolve_dimension_value(&self, client_id: &str, dimension: &str, code: &str) -> Resolved<bool>;

    fn account_amount_baseline(&self, client_id: &str, account_code: &str) -> Resolved<Option<AmountBaseline>>;

    /// Description vocabulary used for account recommendations.
    fn account_vocabulary(&self, _client_id: &str) -> Resolved<Vec<AccountRule>> {
        Ok(Vec::new())
    }
}

/// Find a dimension definition by name, ignoring case.
pub fn find_dimension<'d>(dimensions: &'d [DimensionDefinition], name: &str) -> Option<&'d DimensionDefinition> {
    let name = name.trim();
    dimensions.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

fn value_matches(value: &DimensionValue, code: &str) -> bool {
    let code = code.trim();
    value.code.eq_ignore_ascii_case(code)
        || value.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(code))
}

// ---------------------------------------------------------------------------
// In-memory snapshot
// ---------------------------------------------------------------------------

/// One client's reference data held in memory, loadable from JSON.
///
/// The client id passed to lookups is ignored: a snapshot belongs to a single client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSnapshot {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub dimensions: Vec<DimensionDefinition>,
    #[serde(default)]
    pub baselines: BTreeMap<String, AmountBaseline>,
    #[serde(default)]
    pub rules: Vec<AccountRule>,
}

impl ReferenceSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn with_account(mut self, code: &str, account_type: &str) -> Self {
        let id = self.accounts.len() as i64 + 1;
        self.accounts.push(Account {
            id,
            code: code.to_string(),
            name: String::new(),
            account_type: account_type.to_string(),
            parent_id: None,
            active: true,
        });
        self
    }

    pub fn with_inactive_account(self, code: &str, account_type: &str) -> Self {
        let mut snapshot = self.with_account(code, account_type);
        if let Some(account) = snapshot.accounts.last_mut() {
            account.active = false;
        }
        snapshot
    }

    /// Add a dimension with `(code, display name)` values.
    pub fn with_dimension(mut self, name: &str, values: &[(&str, Option<&str>)]) -> Self {
        self.dimensions.push(DimensionDefinition {
            name: name.to_string(),
            values: values
                .iter()
                .map(|(code, display)| DimensionValue {
                    code: code.to_string(),
                    name: display.map(str::to_string),
                })
                .collect(),
        });
        self
    }

    pub fn with_baseline(mut self, account_code: &str, mean_cents: f64, stddev_cents: f64) -> Self {
        self.baselines.insert(
            account_code.to_string(),
            AmountBaseline {
                mean_cents,
                stddev_cents,
            },
        );
        self
    }

    pub fn with_rule(mut self, pattern: &str, match_type: MatchType, account_code: &str, priority: i64) -> Self {
        self.rules.push(AccountRule {
            pattern: pattern.to_string(),
            match_type,
            account_code: account_code.to_string(),
            vendor: None,
            priority,
        });
        self
    }
}

impl ReferenceData for ReferenceSnapshot {
    fn resolve_account(&self, _client_id: &str, code: &str) -> Resolved<Option<Account>> {
        let code = code.trim();
        Ok(self.accounts.iter().find(|a| a.code == code).cloned())
    }

    fn list_dimensions(&self, _client_id: &str) -> Resolved<Vec<DimensionDefinition>> {
        Ok(self.dimensions.clone())
    }

    fn resolve_dimension_value(&self, _client_id: &str, dimension: &str, code: &str) -> Resolved<bool> {
        Ok(find_dimension(&self.dimensions, dimension)
            .is_some_and(|d| d.values.iter().any(|v| value_matches(v, code))))
    }

    fn account_amount_baseline(&self, _client_id: &str, account_code: &str) -> Resolved<Option<AmountBaseline>> {
        Ok(self.baselines.get(account_code.trim()).copied())
    }

    fn account_vocabulary(&self, _client_id: &str) -> Resolved<Vec<AccountRule>> {
        Ok(self.rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_json_applies_defaults() {
        let json = r#"{
            "accounts": [
                {"id": 1, "code": "1000", "accountType": "asset"},
                {"id": 2, "code": "2000", "accountType": "liability", "active": false}
            ],
            "dimensions": [{"name": "Location", "values": [{"code": "BOS", "name": "Boston"}]}],
            "baselines": {"6100": {"meanCents": 5000.0, "stddevCents": 1000.0}},
            "rules": [{"pattern": "adobe", "matchType": "contains", "accountCode": "6200"}]
        }"#;
        let snapshot = ReferenceSnapshot::from_json(json).unwrap();
        let cash = snapshot.resolve_account("c", "1000").unwrap().unwrap();
        assert!(cash.active);
        assert_eq!(cash.parent_id, None);
        let loan = snapshot.resolve_account("c", "2000").unwrap().unwrap();
        assert!(!loan.active);
        assert_eq!(snapshot.rules[0].priority, 0);
        assert_eq!(snapshot.rules[0].match_type, MatchType::Contains);
        assert!(snapshot.account_amount_baseline("c", "6100").unwrap().is_some());
    }

    #[test]
    fn test_unknown_account_is_none() {
        let snapshot = ReferenceSnapshot::default().with_account("1000", "asset");
        assert_eq!(snapshot.resolve_account("c", "9999").unwrap(), None);
    }

    #[test]
    fn test_dimension_value_matches_code_or_name_ignoring_case() {
        let snapshot = ReferenceSnapshot::default().with_dimension("Location", &[("BOS", Some("Boston"))]);
        assert!(snapshot.resolve_dimension_value("c", "location", "bos").unwrap());
        assert!(snapshot.resolve_dimension_value("c", "Location", "BOSTON").unwrap());
        assert!(!snapshot.resolve_dimension_value("c", "Location", "Denver").unwrap());
        assert!(!snapshot.resolve_dimension_value("c", "Department", "BOS").unwrap());
    }

    #[test]
    fn test_find_dimension_ignores_case_and_whitespace() {
        let dims = ReferenceSnapshot::default().with_dimension("Department", &[]).dimensions;
        assert!(find_dimension(&dims, " department ").is_some());
        assert!(find_dimension(&dims, "Dept").is_none());
    }

    #[test]
    fn test_resolve_errors_keep_their_kind_when_escalated() {
        let err: BatchError = ResolveError::Unavailable("db offline".into()).into();
        assert!(matches!(err, BatchError::ReferenceUnavailable(msg) if msg == "db offline"));

        let err: BatchError = ResolveError::Lookup("bad row in accounts".into()).into();
        assert!(matches!(err, BatchError::ReferenceLookup(ref msg) if msg == "bad row in accounts"));
        assert_eq!(err.to_string(), "Reference lookup failed: bad row in accounts");
    }
}
