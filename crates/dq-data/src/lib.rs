//! Data ingestion and storage for the query platform
//!
//! Uploaded tables flow through [`sources`] (raw reading), [`schema`] (type
//! inference) and [`ingest`] (naming and assembly) before landing in the
//! [`store::RelationalStore`].

pub mod config;
pub mod ingest;
pub mod naming;
pub mod schema;
pub mod sources;
pub mod store;

use arrow::error::ArrowError;
use thiserror::Error;

// Re-exports
pub use config::NullConfig;
pub use ingest::{ingest, ingest_upload, ingest_upload_with, CleanColumn, CleanTable};
pub use naming::{Identifier, InvalidIdentifier};
pub use schema::{ColumnKind, FallbackReason, InferenceOutcome};
pub use sources::{read_upload, FileType, RawTable, RawValue};
pub use store::{
    display_value, ColumnProfile, DisplayRows, RelationalStore, ResultSet, SchemaColumn, SqlValue,
    TableProfile, TableSchema,
};

/// Errors that end an ingestion call
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Excel parsing error: {0}")]
    Excel(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("File contains no columns")]
    Empty,
}

impl From<csv::Error> for IngestionError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => IngestionError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => IngestionError::Csv(error.to_string()),
        }
    }
}

impl From<calamine::Error> for IngestionError {
    fn from(error: calamine::Error) -> Self {
        IngestionError::Excel(error.to_string())
    }
}

/// Errors reported by the relational store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create table '{table}': {source}")]
    CreateFailed {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Export error: {0}")]
    Export(String),
}
