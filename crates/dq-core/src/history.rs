//! Query history log
//!
//! This module keeps an append-only record of asked questions, the SQL that
//! answered them and how many rows came back. Every mutation is written
//! through to a JSON file so the history survives restarts.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of records kept; older records are evicted first
pub const MAX_HISTORY_RECORDS: usize = 100;

/// Fields every imported record must carry
const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "question", "sql_query", "result_count"];

/// Timestamp layout written for new records
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Errors surfaced by explicit history file operations
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid history file format: {0}")]
    Validation(String),
}

/// A single logged query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// ISO-8601 time the query was logged
    pub timestamp: String,

    /// Question as typed by the user
    pub question: String,

    /// SQL that was executed
    pub sql_query: String,

    /// Number of rows returned
    pub result_count: u64,
}

impl HistoryRecord {
    /// Create a record stamped with the current local time
    pub fn now(question: impl Into<String>, sql_query: impl Into<String>, result_count: u64) -> Self {
        Self {
            timestamp: Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string(),
            question: question.into(),
            sql_query: sql_query.into(),
            result_count,
        }
    }

    /// Grouping key used for popularity: the first three words, lowercased
    pub fn pattern(&self) -> String {
        self.question
            .to_lowercase()
            .split_whitespace()
            .take(3)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Earliest and latest timestamps in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: String,
    pub latest: String,
}

/// Aggregate view over the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStatistics {
    pub total_queries: usize,
    pub date_range: Option<DateRange>,
    pub most_common_words: Vec<(String, usize)>,
    pub avg_results_per_query: f64,
}

impl Default for HistoryStatistics {
    fn default() -> Self {
        Self {
            total_queries: 0,
            date_range: None,
            most_common_words: Vec::new(),
            avg_results_per_query: 0.0,
        }
    }
}

/// Write-through query history backed by a JSON file
#[derive(Debug)]
pub struct QueryHistory {
    /// Backing file
    path: PathBuf,

    /// Records in insertion order, oldest first
    records: VecDeque<HistoryRecord>,
}

impl QueryHistory {
    /// Open the history stored at `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut records = Self::load(&path);
        while records.len() > MAX_HISTORY_RECORDS {
            records.pop_front();
        }
        debug!("Loaded {} history records from {:?}", records.len(), path);

        Self { path, records }
    }

    fn load(path: &Path) -> VecDeque<HistoryRecord> {
        if !path.exists() {
            return VecDeque::new();
        }

        let loaded = fs::read_to_string(path)
            .map_err(HistoryError::from)
            .and_then(|text| serde_json::from_str::<Vec<HistoryRecord>>(&text).map_err(HistoryError::from));

        match loaded {
            Ok(records) => records.into(),
            Err(e) => {
                warn!("Ignoring unreadable history file {:?}: {}", path, e);
                VecDeque::new()
            }
        }
    }

    /// Persist the full history; failures are logged and otherwise ignored
    fn save(&self) {
        let result = serde_json::to_string_pretty(&self.records)
            .map_err(HistoryError::from)
            .and_then(|json| fs::write(&self.path, json).map_err(HistoryError::from));

        if let Err(e) = result {
            warn!("Failed to save query history to {:?}: {}", self.path, e);
        }
    }

    fn evict_overflow(&mut self) {
        while self.records.len() > MAX_HISTORY_RECORDS {
            self.records.pop_front();
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log a query with the current timestamp
    pub fn append(&mut self, question: &str, sql_query: &str, result_count: u64) -> &HistoryRecord {
        self.append_record(HistoryRecord::now(question, sql_query, result_count))
    }

    /// Log a fully formed record
    pub fn append_record(&mut self, record: HistoryRecord) -> &HistoryRecord {
        self.records.push_back(record);
        self.evict_overflow();
        self.save();

        &self.records[self.records.len() - 1]
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first
    pub fn all(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    /// Record at `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&HistoryRecord> {
        self.records.get(index)
    }

    /// The last `limit` records in chronological order
    pub fn recent(&self, limit: usize) -> Vec<&HistoryRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).collect()
    }

    /// Case-insensitive substring search over question and SQL
    pub fn search(&self, term: &str) -> Vec<&HistoryRecord> {
        let term = term.to_lowercase();
        self.records
            .iter()
            .filter(|record| {
                record.question.to_lowercase().contains(&term)
                    || record.sql_query.to_lowercase().contains(&term)
            })
            .collect()
    }

    /// Most recent record of each of the `limit` most frequent question patterns
    pub fn popular(&self, limit: usize) -> Vec<&HistoryRecord> {
        let mut groups: IndexMap<String, (usize, &HistoryRecord)> = IndexMap::new();
        for record in &self.records {
            groups
                .entry(record.pattern())
                .and_modify(|(count, latest)| {
                    *count += 1;
                    *latest = record;
                })
                .or_insert((1, record));
        }

        // Stable sort keeps discovery order among equal counts
        let mut ranked: Vec<(usize, &HistoryRecord)> = groups.into_values().collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        ranked.into_iter().take(limit).map(|(_, record)| record).collect()
    }

    /// Summary statistics; an empty history yields zeroed values
    pub fn statistics(&self) -> HistoryStatistics {
        if self.records.is_empty() {
            return HistoryStatistics::default();
        }

        let total_queries = self.records.len();

        let mut earliest: Option<(NaiveDateTime, &str)> = None;
        let mut latest: Option<(NaiveDateTime, &str)> = None;
        for record in &self.records {
            let Some(ts) = record.parsed_timestamp() else {
                continue;
            };
            if earliest.map_or(true, |(e, _)| ts < e) {
                earliest = Some((ts, record.timestamp.as_str()));
            }
            if latest.map_or(true, |(l, _)| ts > l) {
                latest = Some((ts, record.timestamp.as_str()));
            }
        }
        let date_range = earliest.zip(latest).map(|((_, e), (_, l))| DateRange {
            earliest: e.to_string(),
            latest: l.to_string(),
        });

        let mut word_freq: IndexMap<String, usize> = IndexMap::new();
        let mut total_results: u64 = 0;
        for record in &self.records {
            for word in record.question.to_lowercase().split_whitespace() {
                if word.chars().count() > 3 {
                    *word_freq.entry(word.to_string()).or_insert(0) += 1;
                }
            }
            total_results += record.result_count;
        }

        let mut most_common_words: Vec<(String, usize)> = word_freq.into_iter().collect();
        most_common_words.sort_by(|a, b| b.1.cmp(&a.1));
        most_common_words.truncate(10);

        HistoryStatistics {
            total_queries,
            date_range,
            most_common_words,
            avg_results_per_query: total_results as f64 / total_queries as f64,
        }
    }

    /// Remove every record
    pub fn clear(&mut self) {
        self.records.clear();
        self.save();
    }

    /// Write the full history to `path` as JSON
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(path.as_ref(), json)?;
        debug!("Exported {} history records to {:?}", self.records.len(), path.as_ref());
        Ok(())
    }

    /// Append the records stored in `path`.
    ///
    /// The file must hold a JSON list whose items all carry the four record
    /// fields; otherwise nothing is imported.
    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<usize, HistoryError> {
        let text = fs::read_to_string(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_str(&text)?;

        let items = value.as_array().ok_or_else(|| {
            HistoryError::Validation("history file must contain a list of queries".to_string())
        })?;

        for (idx, item) in items.iter().enumerate() {
            let has_all = item
                .as_object()
                .map(|obj| REQUIRED_FIELDS.iter().all(|field| obj.contains_key(*field)))
                .unwrap_or(false);
            if !has_all {
                return Err(HistoryError::Validation(format!(
                    "record {} is missing one of {:?}",
                    idx, REQUIRED_FIELDS
                )));
            }
        }

        let imported: Vec<HistoryRecord> = serde_json::from_value(value)
            .map_err(|e| HistoryError::Validation(e.to_string()))?;
        let count = imported.len();

        self.records.extend(imported);
        self.evict_overflow();
        self.save();

        Ok(count)
    }
}

/// Default file name for an export taken now
pub fn default_export_file_name() -> String {
    format!("query_history_export_{}.json", Local::now().format("%Y%m%d_%H%M%S"))
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_local()))
}
