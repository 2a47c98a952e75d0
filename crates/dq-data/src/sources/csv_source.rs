//! Delimited text reader

use csv::ReaderBuilder;
use tracing::debug;

use super::{RawTable, RawValue};
use crate::config::NullConfig;
use crate::IngestionError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read comma-separated bytes with a header row.
///
/// Short rows are padded with nulls by the caller; a row with more fields
/// than the header is malformed.
pub fn read_csv(bytes: &[u8], nulls: &NullConfig) -> Result<RawTable, IngestionError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() > width {
            return Err(IngestionError::Csv(format!(
                "row {} has {} fields, expected at most {}",
                idx + 2,
                record.len(),
                width
            )));
        }

        let row = record
            .iter()
            .map(|field| {
                if nulls.is_null(field) {
                    RawValue::Null
                } else {
                    RawValue::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    debug!("Read {} CSV rows across {} columns", rows.len(), width);
    Ok(RawTable { columns, rows })
}
