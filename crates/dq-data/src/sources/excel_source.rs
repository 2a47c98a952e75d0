//! Spreadsheet reader (first worksheet only)

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use tracing::{debug, warn};

use super::{RawTable, RawValue};
use crate::config::NullConfig;
use crate::IngestionError;

/// Format used when a native spreadsheet date is handed on as text
const DATETIME_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Read the first worksheet. Its first row is the header.
pub fn read_first_sheet(bytes: &[u8], nulls: &NullConfig) -> Result<RawTable, IngestionError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let sheet_count = workbook.sheet_names().len();
    if sheet_count > 1 {
        debug!("Workbook has {} sheets; reading only the first", sheet_count);
    }

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Err(IngestionError::Empty),
    };

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(header_text).collect(),
        None => return Ok(RawTable::default()),
    };

    let rows: Vec<Vec<RawValue>> = rows
        .map(|row| row.iter().map(|cell| cell_value(cell, nulls)).collect())
        .collect();

    debug!("Read {} spreadsheet rows across {} columns", rows.len(), columns.len());
    Ok(RawTable { columns, rows })
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.as_string().unwrap_or_else(|| other.to_string()),
    }
}

/// Convert one cell. Native dates become text so that date detection treats
/// them like any other date string.
pub(crate) fn cell_value(cell: &Data, nulls: &NullConfig) -> RawValue {
    match cell {
        Data::Empty => RawValue::Null,
        Data::Int(i) => RawValue::Integer(*i),
        Data::Float(f) if f.is_nan() => RawValue::Null,
        Data::Float(f) => RawValue::Float(*f),
        Data::String(s) if nulls.is_null(s) => RawValue::Null,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Bool(b) => RawValue::Text(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) => RawValue::Text(dt.format(DATETIME_TEXT_FORMAT).to_string()),
            None => {
                warn!("Unrepresentable spreadsheet date {:?}", cell);
                RawValue::Null
            }
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
        Data::Error(_) => RawValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE_XLSX: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/people.xlsx"));

    #[test]
    fn test_reads_first_sheet_of_workbook() {
        let raw = read_first_sheet(PEOPLE_XLSX, &NullConfig::default()).unwrap();

        assert_eq!(raw.columns, vec!["Name", "Joined On", "Visits", "Score"]);
        assert_eq!(raw.rows.len(), 3);
        assert_eq!(raw.rows[0][0], RawValue::Text("Ann".to_string()));
        assert_eq!(
            raw.rows[0][1],
            RawValue::Text("2024-01-05 00:00:00".to_string())
        );
        assert_eq!(raw.rows[0][2], RawValue::Float(3.0));
        assert_eq!(raw.rows[2][1], RawValue::Null);
    }

    #[test]
    fn test_cell_conversion() {
        let nulls = NullConfig::default();
        assert_eq!(cell_value(&Data::Empty, &nulls), RawValue::Null);
        assert_eq!(cell_value(&Data::Int(7), &nulls), RawValue::Integer(7));
        assert_eq!(cell_value(&Data::Float(2.5), &nulls), RawValue::Float(2.5));
        assert_eq!(cell_value(&Data::Float(f64::NAN), &nulls), RawValue::Null);
        assert_eq!(
            cell_value(&Data::String("NA".to_string()), &nulls),
            RawValue::Null
        );
        assert_eq!(
            cell_value(&Data::Bool(true), &nulls),
            RawValue::Text("True".to_string())
        );
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-01-05T10:00:00".to_string()), &nulls),
            RawValue::Text("2024-01-05T10:00:00".to_string())
        );
    }

    #[test]
    fn test_header_text() {
        assert_eq!(header_text(&Data::String("Name".to_string())), "Name");
        assert_eq!(header_text(&Data::Empty), "");
        assert_eq!(header_text(&Data::Int(2023)), "2023");
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = read_first_sheet(b"definitely not a workbook", &NullConfig::default());
        assert!(matches!(result, Err(IngestionError::Excel(_))));
    }
}
