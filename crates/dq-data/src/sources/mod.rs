//! Raw readers for uploaded files
//!
//! Readers only split bytes into a header row and positional cells. Typing
//! happens later in [`crate::schema`].

pub mod csv_source;
pub mod excel_source;

use std::fmt;

use tracing::debug;

use crate::config::NullConfig;
use crate::IngestionError;

/// A single cell as read from the upload
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str(""),
            RawValue::Text(s) => f.write_str(s),
            RawValue::Integer(i) => write!(f, "{}", i),
            RawValue::Float(v) => write!(f, "{}", v),
        }
    }
}

static NULL_CELL: RawValue = RawValue::Null;

/// Header row plus positional rows. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &RawValue> + '_ {
        self.rows.iter().map(move |row| row.get(index).unwrap_or(&NULL_CELL))
    }

    /// Pad short rows and replace blank headers with `Unnamed: {i}`
    pub(crate) fn normalized(mut self) -> Self {
        for (i, name) in self.columns.iter_mut().enumerate() {
            if name.trim().is_empty() {
                *name = format!("Unnamed: {}", i);
            }
        }
        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, RawValue::Null);
        }
        self
    }
}

/// Upload formats recognized by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Excel,
}

impl FileType {
    pub fn from_file_name(file_name: &str) -> Result<Self, IngestionError> {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(FileType::Csv),
            "xlsx" | "xls" => Ok(FileType::Excel),
            _ => Err(IngestionError::UnsupportedFormat(file_name.to_string())),
        }
    }
}

/// Read an upload into a [`RawTable`], choosing the reader from the file name
pub fn read_upload(bytes: &[u8], file_name: &str) -> Result<RawTable, IngestionError> {
    read_upload_with(bytes, file_name, &NullConfig::default())
}

pub fn read_upload_with(
    bytes: &[u8],
    file_name: &str,
    nulls: &NullConfig,
) -> Result<RawTable, IngestionError> {
    let file_type = FileType::from_file_name(file_name)?;
    debug!("Reading {} as {:?} ({} bytes)", file_name, file_type, bytes.len());

    let table = match file_type {
        FileType::Csv => csv_source::read_csv(bytes, nulls)?,
        FileType::Excel => excel_source::read_first_sheet(bytes, nulls)?,
    };

    if table.columns.is_empty() {
        return Err(IngestionError::Empty);
    }
    Ok(table.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_file_name("a.csv").unwrap(), FileType::Csv);
        assert_eq!(FileType::from_file_name("A.CSV").unwrap(), FileType::Csv);
        assert_eq!(FileType::from_file_name("b.xlsx").unwrap(), FileType::Excel);
        assert_eq!(FileType::from_file_name("c.xls").unwrap(), FileType::Excel);
    }

    #[test]
    fn test_unsupported_format() {
        for name in ["notes.txt", "data.json", "noext"] {
            assert!(matches!(
                read_upload(b"a,b\n1,2\n", name),
                Err(IngestionError::UnsupportedFormat(_))
            ));
        }
    }

    #[test]
    fn test_empty_upload() {
        assert!(matches!(read_upload(b"", "empty.csv"), Err(IngestionError::Empty)));
    }

    #[test]
    fn test_blank_headers_named_by_position() {
        let table = read_upload(b"a,,c\n1,2,3\n", "t.csv").unwrap();
        assert_eq!(table.columns, vec!["a", "Unnamed: 1", "c"]);
    }

    #[test]
    fn test_short_rows_padded() {
        let table = read_upload(b"a,b,c\n1,2\n", "t.csv").unwrap();
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.rows[0][2], RawValue::Null);
    }
}
