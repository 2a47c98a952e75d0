//! Core functionality for the data query platform
//!
//! This crate provides the query history log and the application settings
//! shared by the other crates.

pub mod history;
pub mod settings;

// Re-export commonly used types
pub use history::{
    DateRange, HistoryError, HistoryRecord, HistoryStatistics, QueryHistory,
    MAX_HISTORY_RECORDS,
};
pub use settings::{AppSettings, GeneratorSettings};
