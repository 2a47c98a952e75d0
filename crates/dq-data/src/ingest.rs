//! Turning a raw upload into a named, typed table

use std::sync::Arc;

use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::pretty::pretty_format_batches;
use tracing::{info, warn};

use crate::config::NullConfig;
use crate::naming::{self, Identifier};
use crate::schema::{self, ColumnKind, InferenceOutcome};
use crate::sources::{self, RawTable, RawValue};
use crate::IngestionError;

/// A column of a cleaned table
#[derive(Debug, Clone, PartialEq)]
pub struct CleanColumn {
    pub name: Identifier,
    /// Header as it appeared in the upload
    pub source_name: String,
    pub outcome: InferenceOutcome,
}

impl CleanColumn {
    pub fn kind(&self) -> ColumnKind {
        self.outcome.kind()
    }
}

/// An uploaded table with safe names and typed columns
#[derive(Debug, Clone)]
pub struct CleanTable {
    name: Identifier,
    columns: Vec<CleanColumn>,
    batch: RecordBatch,
}

impl CleanTable {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn columns(&self) -> &[CleanColumn] {
        &self.columns
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Render the first `rows` rows as a text table
    pub fn preview(&self, rows: usize) -> Result<String, IngestionError> {
        let head = self.batch.slice(0, rows.min(self.batch.num_rows()));
        Ok(pretty_format_batches(&[head])?.to_string())
    }
}

/// Name and type a raw table
pub fn ingest(raw: RawTable, source_name: &str) -> Result<CleanTable, IngestionError> {
    if raw.columns.is_empty() {
        return Err(IngestionError::Empty);
    }

    let name = naming::table_name(source_name);
    let names = naming::unique_column_names(&raw.columns);

    let mut columns = Vec::with_capacity(names.len());
    let mut fields = Vec::with_capacity(names.len());
    let mut arrays = Vec::with_capacity(names.len());

    for (index, column_name) in names.into_iter().enumerate() {
        let values: Vec<&RawValue> = raw.column_values(index).collect();
        let inferred = schema::infer_column(&values);

        if let InferenceOutcome::Coerced { kind, nulled } = inferred.outcome {
            warn!(
                "Column '{}' read as {} with {} value(s) set to null",
                column_name, kind, nulled
            );
        }

        let kind = inferred.outcome.kind();
        fields.push(Field::new(column_name.as_str(), kind.arrow_type(), true));
        arrays.push(inferred.data.into_array());
        columns.push(CleanColumn {
            name: column_name,
            source_name: raw.columns[index].clone(),
            outcome: inferred.outcome,
        });
    }

    let options = RecordBatchOptions::new().with_row_count(Some(raw.row_count()));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;

    info!(
        "Ingested {} as '{}' ({} rows, {} columns)",
        source_name,
        name,
        batch.num_rows(),
        columns.len()
    );

    Ok(CleanTable {
        name,
        columns,
        batch,
    })
}

/// Read and ingest an uploaded file in one step
pub fn ingest_upload(bytes: &[u8], file_name: &str) -> Result<CleanTable, IngestionError> {
    ingest_upload_with(bytes, file_name, &NullConfig::default())
}

pub fn ingest_upload_with(
    bytes: &[u8],
    file_name: &str,
    nulls: &NullConfig,
) -> Result<CleanTable, IngestionError> {
    let raw = sources::read_upload_with(bytes, file_name, nulls)?;
    ingest(raw, file_name)
}
