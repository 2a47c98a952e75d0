//! Materialized query results

use rusqlite::types::Value as SqlValue;

use crate::StoreError;

/// Rows and column names returned by a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// A result prepared for display
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Row count before the display cap was applied
    pub total_rows: usize,
}

impl DisplayRows {
    pub fn truncated(&self) -> bool {
        self.rows.len() < self.total_rows
    }
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `max_rows` rows as text, reals rounded to two decimals
    pub fn display(&self, max_rows: usize) -> DisplayRows {
        let rows = self
            .rows
            .iter()
            .take(max_rows)
            .map(|row| row.iter().map(display_value).collect())
            .collect();

        DisplayRows {
            columns: self.columns.clone(),
            rows,
            total_rows: self.rows.len(),
        }
    }

    /// Full result as CSV with a header row. Nulls are written as empty fields.
    pub fn to_csv(&self) -> Result<String, StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|e| StoreError::Export(e.to_string()))?;

        for row in &self.rows {
            let record: Vec<String> = row.iter().map(export_value).collect();
            writer
                .write_record(&record)
                .map_err(|e| StoreError::Export(e.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| StoreError::Export(e.to_string()))
    }
}

pub fn display_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Real(f) => format_real(*f),
        other => export_value(other),
    }
}

fn export_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn format_real(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet {
            columns: vec!["name".to_string(), "score".to_string()],
            rows: vec![
                vec![SqlValue::Text("a, b".to_string()), SqlValue::Real(1.23456)],
                vec![SqlValue::Null, SqlValue::Integer(7)],
                vec![SqlValue::Text("c".to_string()), SqlValue::Real(2.5)],
            ],
        }
    }

    #[test]
    fn test_display_rounds_and_caps() {
        let shown = sample().display(2);
        assert_eq!(shown.rows.len(), 2);
        assert_eq!(shown.total_rows, 3);
        assert!(shown.truncated());
        assert_eq!(shown.rows[0], vec!["a, b", "1.23"]);
        assert_eq!(shown.rows[1], vec!["NULL", "7"]);
    }

    #[test]
    fn test_display_not_truncated() {
        assert!(!sample().display(1000).truncated());
    }

    #[test]
    fn test_to_csv() {
        let csv = sample().to_csv().unwrap();
        assert_eq!(csv, "name,score\n\"a, b\",1.23456\n,7\nc,2.5\n");
    }
}
