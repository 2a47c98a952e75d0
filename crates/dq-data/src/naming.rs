//! Identifier sanitization
//!
//! Table and column names produced here are the only names the store will
//! interpolate into SQL text. [`Identifier`] can be obtained from the
//! sanitizers below or by validating a string that already satisfies the
//! same rules.

use std::fmt;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use thiserror::Error;

/// Maximum length of a generated table name
const MAX_TABLE_NAME_LEN: usize = 50;

/// Prefix SQLite keeps for internal tables
const RESERVED_PREFIX: &str = "sqlite_";

/// A lowercase SQL-safe name: starts with `[a-z]`, then only `[a-z0-9_]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not a valid identifier")]
pub struct InvalidIdentifier(pub String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(value: &str) -> bool {
        let mut chars = value.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl TryFrom<&str> for Identifier {
    type Error = InvalidIdentifier;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if Self::is_valid(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidIdentifier(value.to_string()))
        }
    }
}

impl TryFrom<String> for Identifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Replace anything outside `[A-Za-z0-9_]` with `_`, collapse runs of `_`
/// and trim them from both ends.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

fn starts_with_letter(value: &str) -> bool {
    value.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Derive a table name from an uploaded file name
pub fn table_name(source_name: &str) -> Identifier {
    let stem = match source_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => source_name,
    };

    let mut name = sanitize(stem);
    // SQLite refuses to create tables under its own prefix
    if !starts_with_letter(&name) || name.to_ascii_lowercase().starts_with(RESERVED_PREFIX) {
        name = format!("table_{}", name);
    }
    name.truncate(MAX_TABLE_NAME_LEN);

    // Truncation or an empty stem can leave a dangling separator
    let name = name.trim_end_matches('_').to_lowercase();
    Identifier(name)
}

/// Sanitize a single column header
pub fn column_name(raw: &str) -> Identifier {
    let name = sanitize(raw);
    let name = if starts_with_letter(&name) {
        name
    } else {
        format!("col_{}", name)
    };
    Identifier(name.to_lowercase())
}

/// Sanitize a header row, suffixing repeats with `_1`, `_2`, ... in first-seen
/// order. Suffixes never reuse a name another column already has.
pub fn unique_column_names<S: AsRef<str>>(raw: &[S]) -> Vec<Identifier> {
    let base: Vec<String> = raw.iter().map(|r| column_name(r.as_ref()).0).collect();

    let mut taken: AHashSet<String> = base.iter().cloned().collect();
    let mut seen: AHashMap<String, usize> = AHashMap::new();
    let mut names = Vec::with_capacity(base.len());

    for name in base {
        match seen.get_mut(&name) {
            Some(counter) => {
                let candidate = loop {
                    *counter += 1;
                    let candidate = format!("{}_{}", name, counter);
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                };
                taken.insert(candidate.clone());
                names.push(Identifier(candidate));
            }
            None => {
                seen.insert(name.clone(), 0);
                names.push(Identifier(name));
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ids: &[Identifier]) -> Vec<&str> {
        ids.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn test_table_name_from_file() {
        assert_eq!(table_name("People Data.csv").as_str(), "people_data");
        assert_eq!(table_name("sales-2024 (final).xlsx").as_str(), "sales_2024_final");
        assert_eq!(table_name("archive.tar.csv").as_str(), "archive_tar");
        assert_eq!(table_name("2024_report.csv").as_str(), "table_2024_report");
        assert_eq!(table_name("__Mixed__Case__.xls").as_str(), "mixed_case");
        assert_eq!(table_name("noext").as_str(), "noext");
    }

    #[test]
    fn test_table_name_degenerate_inputs() {
        assert_eq!(table_name("!!!.csv").as_str(), "table");
        assert_eq!(table_name(".csv").as_str(), "table");
        assert_eq!(table_name("é.csv").as_str(), "table");
    }

    #[test]
    fn test_table_name_avoids_reserved_prefix() {
        assert_eq!(table_name("sqlite_export.csv").as_str(), "table_sqlite_export");
        assert_eq!(table_name("SQLite Stats.csv").as_str(), "table_sqlite_stats");
        assert_eq!(table_name("sqlitedb.csv").as_str(), "sqlitedb");
    }

    #[test]
    fn test_table_name_truncates() {
        let long = format!("{}.csv", "a".repeat(80));
        assert_eq!(table_name(&long).as_str().len(), 50);

        // Cutting right after a separator must not leave it dangling
        let edge = format!("{}_bbbb.csv", "a".repeat(49));
        assert_eq!(table_name(&edge).as_str(), "a".repeat(49));
    }

    #[test]
    fn test_table_name_idempotent() {
        let repeated = "z_".repeat(40);
        for raw in ["People Data.csv", "2024 report.xlsx", "x", "A--B", repeated.as_str()] {
            let once = table_name(raw);
            let twice = table_name(once.as_str());
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_column_name_rules() {
        assert_eq!(column_name("Customer ID").as_str(), "customer_id");
        assert_eq!(column_name("Unit Price ($)").as_str(), "unit_price");
        assert_eq!(column_name("2023").as_str(), "col_2023");
        assert_eq!(column_name("%").as_str(), "col_");
        assert_eq!(column_name("").as_str(), "col_");
    }

    #[test]
    fn test_column_name_idempotent() {
        for raw in ["Customer ID", "2023", "a__b", "Total (USD)", "x1"] {
            let once = column_name(raw);
            assert_eq!(column_name(once.as_str()), once);
        }
    }

    #[test]
    fn test_duplicate_columns_suffixed_in_order() {
        let ids = unique_column_names(&["Name", "name", "NAME ", "id"]);
        assert_eq!(names(&ids), vec!["name", "name_1", "name_2", "id"]);
    }

    #[test]
    fn test_duplicate_suffix_skips_existing_names() {
        let ids = unique_column_names(&["a", "a", "a_1"]);
        assert_eq!(names(&ids), vec!["a", "a_2", "a_1"]);

        let distinct: AHashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), ids.len());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(Identifier::try_from("people_data").is_ok());
        assert!(Identifier::try_from("col_").is_ok());
        assert!(Identifier::try_from("People").is_err());
        assert!(Identifier::try_from("1abc").is_err());
        assert!(Identifier::try_from("a; DROP TABLE x").is_err());
        assert!(Identifier::try_from("").is_err());
    }
}
