use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension};
use tracing::warn;

use crate::error::Result;
use crate::models::{Account, AccountRule, AmountBaseline, DimensionDefinition, DimensionValue, MatchType};
use crate::reference::{ReferenceData, ResolveError, Resolved};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    client_id TEXT NOT NULL,
    code TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    account_type TEXT NOT NULL,
    parent_id INTEGER,
    is_active INTEGER DEFAULT 1,
    UNIQUE (client_id, code),
    FOREIGN KEY (parent_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS dimensions (
    id INTEGER PRIMARY KEY,
    client_id TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (client_id, name)
);

CREATE TABLE IF NOT EXISTS dimension_values (
    id INTEGER PRIMARY KEY,
    dimension_id INTEGER NOT NULL,
    code TEXT NOT NULL,
    name TEXT,
    UNIQUE (dimension_id, code),
    FOREIGN KEY (dimension_id) REFERENCES dimensions(id)
);

CREATE TABLE IF NOT EXISTS account_baselines (
    client_id TEXT NOT NULL,
    account_code TEXT NOT NULL,
    mean_cents REAL NOT NULL,
    stddev_cents REAL NOT NULL,
    PRIMARY KEY (client_id, account_code)
);

CREATE TABLE IF NOT EXISTS account_rules (
    id INTEGER PRIMARY KEY,
    client_id TEXT NOT NULL,
    pattern TEXT NOT NULL,
    match_type TEXT DEFAULT 'contains',
    account_code TEXT NOT NULL,
    vendor TEXT,
    priority INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1
);
";

fn classify(e: rusqlite::Error) -> ResolveError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if matches!(
            err.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
        ) {
            return ResolveError::Unavailable(e.to_string());
        }
    }
    let msg = e.to_string();
    if msg.contains("no such table") {
        ResolveError::Unavailable(msg)
    } else {
        ResolveError::Lookup(msg)
    }
}

/// Chart of accounts and dimension vocabulary read from a SQLite database.
///
/// Opened read-only; every table is keyed by `client_id`.
pub struct SqliteReference {
    conn: Mutex<Connection>,
}

impl SqliteReference {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Resolved<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ResolveError::Unavailable("reference connection poisoned".to_string()))
    }
}

impl ReferenceData for SqliteReference {
    fn resolve_account(&self, client_id: &str, code: &str) -> Resolved<Option<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, code, name, account_type, parent_id, is_active FROM accounts \
                 WHERE client_id = ?1 AND code = ?2",
            )
            .map_err(classify)?;
        stmt.query_row(rusqlite::params![client_id, code.trim()], |row| {
            Ok(Account {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
                account_type: row.get(3)?,
                parent_id: row.get(4)?,
                active: row.get::<_, i64>(5)? != 0,
            })
        })
        .optional()
        .map_err(classify)
    }

    fn list_dimensions(&self, client_id: &str) -> Resolved<Vec<DimensionDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT d.name, v.code, v.name FROM dimensions d \
                 LEFT JOIN dimension_values v ON v.dimension_id = d.id \
                 WHERE d.client_id = ?1 ORDER BY d.name, v.code",
            )
            .map_err(classify)?;
        let rows: Vec<(String, Option<String>, Option<String>)> = stmt
            .query_map([client_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(classify)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(classify)?;

        let mut dimensions: Vec<DimensionDefinition> = Vec::new();
        for (dim_name, code, value_name) in rows {
            if dimensions.last().map(|d| d.name != dim_name).unwrap_or(true) {
                dimensions.push(DimensionDefinition {
                    name: dim_name,
                    values: Vec::new(),
                });
            }
            if let (Some(code), Some(current)) = (code, dimensions.last_mut()) {
                current.values.push(DimensionValue { code, name: value_name });
            }
        }
        Ok(dimensions)
    }

    fn resolve_dimension_value(&self, client_id: &str, dimension: &str, code: &str) -> Resolved<bool> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT 1 FROM dimension_values v JOIN dimensions d ON v.dimension_id = d.id \
                 WHERE d.client_id = ?1 AND d.name = ?2 COLLATE NOCASE \
                 AND (v.code = ?3 COLLATE NOCASE OR v.name = ?3 COLLATE NOCASE)",
            )
            .map_err(classify)?;
        stmt.exists(rusqlite::params![client_id, dimension.trim(), code.trim()])
            .map_err(classify)
    }

    fn account_amount_baseline(&self, client_id: &str, account_code: &str) -> Resolved<Option<AmountBaseline>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT mean_cents, stddev_cents FROM account_baselines \
                 WHERE client_id = ?1 AND account_code = ?2",
            )
            .map_err(classify)?;
        stmt.query_row(rusqlite::params![client_id, account_code.trim()], |row| {
            Ok(AmountBaseline {
                mean_cents: row.get(0)?,
                stddev_cents: row.get(1)?,
            })
        })
        .optional()
        .map_err(classify)
    }

    fn account_vocabulary(&self, client_id: &str) -> Resolved<Vec<AccountRule>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT pattern, match_type, account_code, vendor, priority FROM account_rules \
                 WHERE client_id = ?1 AND is_active = 1 ORDER BY priority DESC, id",
            )
            .map_err(classify)?;
        let rows: Vec<(String, Option<String>, String, Option<String>, i64)> = stmt
            .query_map([client_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })
            .map_err(classify)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(classify)?;

        let mut rules = Vec::with_capacity(rows.len());
        for (pattern, match_type, account_code, vendor, priority) in rows {
            let raw_type = match_type.unwrap_or_else(|| "contains".to_string());
            let Some(match_type) = MatchType::parse(&raw_type) else {
                warn!(pattern = %pattern, match_type = %raw_type, "skipping rule with unknown match type");
                continue;
            };
            rules.push(AccountRule {
                pattern,
                match_type,
                account_code,
                vendor,
                priority,
            });
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, SqliteReference) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            "INSERT INTO accounts (client_id, code, name, account_type) VALUES ('acme', '1000', 'Cash', 'asset');
             INSERT INTO accounts (client_id, code, name, account_type, parent_id, is_active) VALUES ('acme', '1010', 'Old Cash', 'asset', 1, 0);
             INSERT INTO accounts (client_id, code, name, account_type) VALUES ('other', '4000', 'Sales', 'income');
             INSERT INTO dimensions (client_id, name) VALUES ('acme', 'Location');
             INSERT INTO dimensions (client_id, name) VALUES ('acme', 'Department');
             INSERT INTO dimension_values (dimension_id, code, name) VALUES (1, 'BOS', 'Boston');
             INSERT INTO dimension_values (dimension_id, code, name) VALUES (1, 'NYC', 'New York');
             INSERT INTO account_baselines (client_id, account_code, mean_cents, stddev_cents) VALUES ('acme', '1000', 10000.0, 2500.0);
             INSERT INTO account_rules (client_id, pattern, match_type, account_code, priority) VALUES ('acme', 'ADOBE', 'contains', '6200', 5);
             INSERT INTO account_rules (client_id, pattern, match_type, account_code, priority) VALUES ('acme', 'AWS', 'fuzzy', '6300', 9);
             INSERT INTO account_rules (client_id, pattern, match_type, account_code, priority) VALUES ('acme', '^UBER', 'regex', '6400', 7);",
        )
        .unwrap();
        drop(conn);
        let reference = SqliteReference::open(&path).unwrap();
        (dir, reference)
    }

    #[test]
    fn test_resolve_account_by_client() {
        let (_dir, db) = test_db();
        let cash = db.resolve_account("acme", "1000").unwrap().unwrap();
        assert_eq!(cash.name, "Cash");
        assert!(cash.active);
        let old = db.resolve_account("acme", "1010").unwrap().unwrap();
        assert!(!old.active);
        assert_eq!(old.parent_id, Some(1));
        assert_eq!(db.resolve_account("acme", "4000").unwrap(), None);
    }

    #[test]
    fn test_list_dimensions_groups_values() {
        let (_dir, db) = test_db();
        let dims = db.list_dimensions("acme").unwrap();
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].name, "Department");
        assert!(dims[0].values.is_empty());
        assert_eq!(dims[1].name, "Location");
        assert_eq!(dims[1].values.len(), 2);
        assert_eq!(dims[1].values[0].name.as_deref(), Some("Boston"));
    }

    #[test]
    fn test_resolve_dimension_value() {
        let (_dir, db) = test_db();
        assert!(db.resolve_dimension_value("acme", "location", "bos").unwrap());
        assert!(db.resolve_dimension_value("acme", "Location", "New York").unwrap());
        assert!(!db.resolve_dimension_value("acme", "Location", "Denver").unwrap());
    }

    #[test]
    fn test_baseline_lookup() {
        let (_dir, db) = test_db();
        let baseline = db.account_amount_baseline("acme", "1000").unwrap().unwrap();
        assert_eq!(baseline.mean_cents, 10000.0);
        assert_eq!(db.account_amount_baseline("acme", "2000").unwrap(), None);
    }

    #[test]
    fn test_vocabulary_ordered_by_priority_and_skips_unknown_types() {
        let (_dir, db) = test_db();
        let rules = db.account_vocabulary("acme").unwrap();
        let patterns: Vec<&str> = rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["^UBER", "ADOBE"]);
        assert_eq!(rules[0].match_type, MatchType::Regex);
    }

    #[test]
    fn test_missing_tables_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path).unwrap().execute_batch("CREATE TABLE unrelated (id INTEGER);").unwrap();
        let db = SqliteReference::open(&path).unwrap();
        assert!(matches!(db.resolve_account("acme", "1000"), Err(ResolveError::Unavailable(_))));
        assert!(matches!(db.list_dimensions("acme"), Err(ResolveError::Unavailable(_))));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteReference::open(&dir.path().join("nope.db")).is_err());
    }
}
