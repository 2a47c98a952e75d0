//! SQLite-backed relational store
//!
//! The store owns one connection and serializes every call on it. Table and
//! column names are quoted but not escaped when built into statements, so
//! every name-taking entry point requires an [`Identifier`].

mod result;

pub use result::{display_value, DisplayRows, ResultSet};
pub use rusqlite::types::Value as SqlValue;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{Float64Type, Int64Type, TimestampMillisecondType};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::ingest::CleanTable;
use crate::naming::Identifier;
use crate::schema::ColumnKind;
use crate::StoreError;

/// Rows included with a schema
const SCHEMA_SAMPLE_ROWS: usize = 3;
/// Distinct storage classes reported per column by a profile
const PROFILE_TYPE_LIMIT: usize = 5;
/// Non-null sample values reported per column by a profile
const PROFILE_SAMPLE_VALUES: usize = 3;

/// Text layout used for datetime columns
const DATETIME_STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Column metadata as declared in the database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaColumn {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub is_primary_key: bool,
}

/// Columns and a few sample rows of one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<SchemaColumn>,
    pub sample_rows: Vec<Vec<SqlValue>>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Observed storage of one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    /// SQLite storage classes seen (`integer`, `real`, `text`, `null`, `blob`)
    pub storage_types: Vec<String>,
    pub sample_values: Vec<SqlValue>,
}

/// Diagnostic summary of a table
#[derive(Debug, Clone, PartialEq)]
pub struct TableProfile {
    pub table_name: String,
    pub row_count: u64,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

pub struct RelationalStore {
    conn: Mutex<Connection>,
    location: String,
}

impl RelationalStore {
    /// Open a database file, or an in-process database for `:memory:`
    pub fn open(location: &str) -> Result<Self, StoreError> {
        let conn = if location == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(location)?
        };
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        info!("Opened relational store at {}", location);
        Ok(Self {
            conn: Mutex::new(conn),
            location: location.to_string(),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Replace `name` with the contents of `table`.
    ///
    /// The old table is dropped before the new one is built, so a failure
    /// leaves no table of that name behind.
    pub fn create_table(&self, table: &CleanTable, name: &Identifier) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let failed = |source: rusqlite::Error| StoreError::CreateFailed {
            table: name.to_string(),
            source,
        };

        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", name))
            .map_err(failed)?;

        let definitions: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.kind().sql_type()))
            .collect();
        let create = format!("CREATE TABLE \"{}\" ({})", name, definitions.join(", "));
        let placeholders: Vec<String> = (1..=table.column_count()).map(|i| format!("?{}", i)).collect();
        let insert = format!("INSERT INTO \"{}\" VALUES ({})", name, placeholders.join(", "));
        debug!("{}", create);

        let tx = conn.transaction().map_err(failed)?;
        tx.execute(&create, []).map_err(failed)?;
        {
            let mut stmt = tx.prepare(&insert).map_err(failed)?;
            let kinds: Vec<ColumnKind> = table.columns().iter().map(|c| c.kind()).collect();
            for row in 0..table.row_count() {
                let values = row_values(table.batch(), &kinds, row);
                stmt.execute(params_from_iter(values.iter())).map_err(failed)?;
            }
        }
        tx.commit().map_err(failed)?;

        info!("Created table '{}' with {} rows", name, table.row_count());
        Ok(())
    }

    /// Run one statement and collect every row it returns
    pub fn execute(&self, sql: &str) -> Result<ResultSet, StoreError> {
        debug!("Executing: {}", sql);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, SqlValue>(i)?);
            }
            rows.push(values);
        }

        Ok(ResultSet { columns, rows })
    }

    pub fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, name: &Identifier) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn columns(&self, name: &Identifier) -> Result<Vec<String>, StoreError> {
        Ok(self
            .column_info(name)?
            .into_iter()
            .map(|column| column.name)
            .collect())
    }

    /// Declared columns plus up to three sample rows
    pub fn schema(&self, name: &Identifier) -> Result<TableSchema, StoreError> {
        let columns = self.column_info(name)?;
        let sample = self.execute(&format!(
            "SELECT * FROM \"{}\" LIMIT {}",
            name, SCHEMA_SAMPLE_ROWS
        ))?;

        Ok(TableSchema {
            table_name: name.to_string(),
            columns,
            sample_rows: sample.rows,
        })
    }

    /// Row count plus the storage classes and a few values seen in each column
    pub fn table_profile(&self, name: &Identifier) -> Result<TableProfile, StoreError> {
        let columns = self.columns(name)?;
        let conn = self.conn.lock();

        let row_count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", name), [], |row| row.get(0))?;

        let mut profiles = Vec::with_capacity(columns.len());
        for column in columns {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT typeof(\"{c}\") FROM \"{t}\" LIMIT {n}",
                c = column,
                t = name,
                n = PROFILE_TYPE_LIMIT
            ))?;
            let storage_types = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(&format!(
                "SELECT \"{c}\" FROM \"{t}\" WHERE \"{c}\" IS NOT NULL LIMIT {n}",
                c = column,
                t = name,
                n = PROFILE_SAMPLE_VALUES
            ))?;
            let sample_values = stmt
                .query_map([], |row| row.get::<_, SqlValue>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            profiles.push(ColumnProfile {
                name: column,
                storage_types,
                sample_values,
            });
        }

        Ok(TableProfile {
            table_name: name.to_string(),
            row_count: row_count.max(0) as u64,
            columns: profiles,
        })
    }

    /// Close the connection, reporting any error SQLite raises on the way out
    pub fn close(self) -> Result<(), StoreError> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| StoreError::Sqlite(e))
    }

    fn column_info(&self, name: &Identifier) -> Result<Vec<SchemaColumn>, StoreError> {
        if !self.table_exists(name)? {
            return Err(StoreError::TableNotFound(name.to_string()));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", name))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(SchemaColumn {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    is_primary_key: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

/// Values of one batch row in insert order
fn row_values(batch: &RecordBatch, kinds: &[ColumnKind], row: usize) -> Vec<SqlValue> {
    kinds
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            let array = batch.column(index);
            if array.is_null(row) {
                return SqlValue::Null;
            }
            match kind {
                ColumnKind::Integer => SqlValue::Integer(array.as_primitive::<Int64Type>().value(row)),
                ColumnKind::Real => SqlValue::Real(array.as_primitive::<Float64Type>().value(row)),
                ColumnKind::DateTime => {
                    let millis = array.as_primitive::<TimestampMillisecondType>().value(row);
                    match DateTime::from_timestamp_millis(millis) {
                        Some(dt) => SqlValue::Text(dt.naive_utc().format(DATETIME_STORAGE_FORMAT).to_string()),
                        None => SqlValue::Null,
                    }
                }
                ColumnKind::Text => SqlValue::Text(array.as_string::<i32>().value(row).to_string()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest_upload;

    fn store_with(csv: &str, file_name: &str) -> (RelationalStore, Identifier) {
        let store = RelationalStore::in_memory().unwrap();
        let table = ingest_upload(csv.as_bytes(), file_name).unwrap();
        let name = table.name().clone();
        store.create_table(&table, &name).unwrap();
        (store, name)
    }

    #[test]
    fn test_create_and_query() {
        let (store, name) = store_with("id,name\n1,a\n2,b\n3,c\n", "People Data.csv");

        let result = store
            .execute("SELECT id, name FROM people_data ORDER BY id DESC")
            .unwrap();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.rows[0][0], SqlValue::Integer(3));
        assert_eq!(result.rows[0][1], SqlValue::Text("c".to_string()));

        assert_eq!(store.list_tables().unwrap(), vec!["people_data"]);
        assert_eq!(store.columns(&name).unwrap(), vec!["id", "name"]);
    }

    #[test]
    fn test_sqlite_prefixed_upload_listed() {
        let (store, name) = store_with("a\n1\n", "SQLiteDB.csv");
        assert_eq!(name.as_str(), "sqlitedb");
        assert_eq!(store.list_tables().unwrap(), vec!["sqlitedb"]);

        // Internal tables stay hidden
        store
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT)")
            .unwrap();
        assert_eq!(store.list_tables().unwrap(), vec!["sqlitedb", "t"]);
    }

    #[test]
    fn test_reserved_file_name_still_creates_table() {
        let (store, name) = store_with("a\n1\n", "sqlite_export.csv");
        assert_eq!(name.as_str(), "table_sqlite_export");
        assert_eq!(store.execute("SELECT a FROM table_sqlite_export").unwrap().row_count(), 1);
    }

    #[test]
    fn test_replace_table() {
        let (store, name) = store_with("a\n1\n2\n", "t.csv");
        let replacement = ingest_upload(b"b,c\nx,y\n", "t.csv").unwrap();
        store.create_table(&replacement, &name).unwrap();

        assert_eq!(store.list_tables().unwrap(), vec!["t"]);
        assert_eq!(store.columns(&name).unwrap(), vec!["b", "c"]);
        assert_eq!(store.execute("SELECT * FROM t").unwrap().row_count(), 1);
    }

    #[test]
    fn test_nulls_and_dates_stored() {
        let (store, _) = store_with("d,v\n2024-01-05,1.5\n,\n", "events.csv");
        let result = store.execute("SELECT d, v FROM events").unwrap();
        assert_eq!(result.rows[0][0], SqlValue::Text("2024-01-05 00:00:00".to_string()));
        assert_eq!(result.rows[0][1], SqlValue::Real(1.5));
        assert_eq!(result.rows[1], vec![SqlValue::Null, SqlValue::Null]);
    }

    #[test]
    fn test_schema_declared_types_and_samples() {
        let (store, name) = store_with("id,price,when\n1,2.5,2024-01-01\n2,3,2024-01-02\n3,4,\n4,5,\n", "s.csv");
        let schema = store.schema(&name).unwrap();

        assert_eq!(schema.table_name, "s");
        let types: Vec<_> = schema.columns.iter().map(|c| c.declared_type.as_str()).collect();
        assert_eq!(types, vec!["INTEGER", "REAL", "TIMESTAMP"]);
        assert_eq!(schema.sample_rows.len(), 3);
    }

    #[test]
    fn test_schema_constraints() {
        let store = RelationalStore::in_memory().unwrap();
        store
            .execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL NOT NULL)")
            .unwrap();

        let name = Identifier::try_from("orders").unwrap();
        let schema = store.schema(&name).unwrap();
        assert!(schema.columns[0].is_primary_key);
        assert!(!schema.columns[0].not_null);
        assert!(schema.columns[1].not_null);
        assert!(schema.sample_rows.is_empty());
    }

    #[test]
    fn test_missing_table() {
        let store = RelationalStore::in_memory().unwrap();
        let name = Identifier::try_from("nothing").unwrap();
        assert!(matches!(store.schema(&name), Err(StoreError::TableNotFound(_))));
        assert!(matches!(store.table_profile(&name), Err(StoreError::TableNotFound(_))));
    }

    #[test]
    fn test_execute_errors_surface() {
        let (store, _) = store_with("a\n1\n", "t.csv");
        assert!(matches!(
            store.execute("SELECT nope FROM t"),
            Err(StoreError::Sqlite(_))
        ));
        assert!(store.execute("SELEC 1").is_err());
    }

    #[test]
    fn test_table_profile() {
        let (store, name) = store_with("id,label\n1,a\n2,\n3,c\n4,d\n", "p.csv");
        let profile = store.table_profile(&name).unwrap();

        assert_eq!(profile.row_count, 4);
        assert_eq!(profile.column_count(), 2);
        assert_eq!(profile.columns[0].storage_types, vec!["integer"]);

        let label = &profile.columns[1];
        assert!(label.storage_types.contains(&"text".to_string()));
        assert!(label.storage_types.contains(&"null".to_string()));
        assert_eq!(
            label.sample_values,
            vec![
                SqlValue::Text("a".to_string()),
                SqlValue::Text("c".to_string()),
                SqlValue::Text("d".to_string())
            ]
        );
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let path = path.to_str().unwrap();

        let store = RelationalStore::open(path).unwrap();
        let table = ingest_upload(b"a\n1\n", "kept.csv").unwrap();
        store.create_table(&table, table.name()).unwrap();
        store.close().unwrap();

        let reopened = RelationalStore::open(path).unwrap();
        assert_eq!(reopened.list_tables().unwrap(), vec!["kept"]);
    }
}
