//! Per-user application context
//!
//! A [`Session`] owns the store, the history and the translator for one user
//! and tracks which table questions are asked against.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use dq_core::{AppSettings, HistoryRecord, QueryHistory};
use dq_data::{
    ingest_upload_with, CleanTable, NullConfig, Identifier, RelationalStore, ResultSet, StoreError, TableProfile,
    TableSchema,
};
use dq_nlsql::{
    suggest_improvements, validate_read_only, GeneratedQuery, GenerationError, QueryTranslator,
    TextGenerator,
};

/// Question recorded for statements typed in by hand
pub const MANUAL_QUERY_LABEL: &str = "Manual SQL Query";

/// A generated query together with what it returned
#[derive(Debug)]
pub struct Answer {
    pub query: GeneratedQuery,
    pub result: ResultSet,
}

pub struct Session {
    settings: AppSettings,
    store: RelationalStore,
    history: QueryHistory,
    translator: Option<QueryTranslator>,
    nulls: NullConfig,
    current_table: Option<Identifier>,
}

impl Session {
    /// Open the configured store and history. Without a generator, only the
    /// commands that do not need one are available.
    pub fn open(settings: AppSettings, generator: Option<Arc<dyn TextGenerator>>) -> Result<Self> {
        let store = RelationalStore::open(&settings.database_path)
            .with_context(|| format!("Failed to open database {}", settings.database_path))?;
        let history = QueryHistory::open(&settings.history_path);
        debug!(
            "Session on {} with history at {}",
            store.location(),
            history.path().display()
        );

        let mut nulls = NullConfig::default();
        for marker in &settings.extra_null_markers {
            nulls.add_marker(marker.as_str());
        }

        Ok(Self {
            settings,
            store,
            history,
            translator: generator.map(QueryTranslator::new),
            nulls,
            current_table: None,
        })
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn current_table(&self) -> Option<&Identifier> {
        self.current_table.as_ref()
    }

    pub fn history(&self) -> &QueryHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut QueryHistory {
        &mut self.history
    }

    /// Ingest an upload, store it and make it the current table
    pub fn upload(&mut self, bytes: &[u8], file_name: &str) -> Result<CleanTable> {
        let table = ingest_upload_with(bytes, file_name, &self.nulls)
            .with_context(|| format!("Error processing file {}", file_name))?;
        self.store.create_table(&table, table.name())?;

        info!("Loaded {} into table '{}'", file_name, table.name());
        self.current_table = Some(table.name().clone());
        Ok(table)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<CleanTable> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Invalid file name: {}", path.display()))?;
        self.upload(&bytes, file_name)
    }

    pub fn select_table(&mut self, name: &str) -> Result<&Identifier> {
        let identifier = Identifier::try_from(name)?;
        if !self.store.table_exists(&identifier)? {
            return Err(StoreError::TableNotFound(name.to_string()).into());
        }
        let selected: &Identifier = self.current_table.insert(identifier);
        Ok(selected)
    }

    /// Select the only table in the store when none is selected yet
    pub fn ensure_table(&mut self) -> Result<&Identifier> {
        if self.current_table.is_none() {
            let tables = self.store.list_tables()?;
            match tables.as_slice() {
                [only] => {
                    let only = only.clone();
                    self.select_table(&only)?;
                }
                [] => return Err(anyhow!("No tables loaded; load a CSV or Excel file first")),
                _ => {
                    return Err(anyhow!(
                        "Several tables are loaded ({}); choose one with --table",
                        tables.join(", ")
                    ))
                }
            }
        }
        self.current_table
            .as_ref()
            .ok_or_else(|| anyhow!("No table selected"))
    }

    pub fn tables(&self) -> Result<Vec<String>> {
        Ok(self.store.list_tables()?)
    }

    pub fn schema(&self, table: &str) -> Result<TableSchema> {
        Ok(self.store.schema(&Identifier::try_from(table)?)?)
    }

    pub fn profile(&self, table: &str) -> Result<TableProfile> {
        Ok(self.store.table_profile(&Identifier::try_from(table)?)?)
    }

    /// Translate a question about the current table, run it and record it
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let table = self.ensure_table()?.clone();
        let translator = self.translator()?;

        let schema = self.store.schema(&table)?;
        let query = translator.generate_sql(question, table.as_str(), &schema).await?;
        validate_read_only(&query.sql)
            .with_context(|| format!("Generated query was rejected: {}", query.sql))?;

        let result = self.store.execute(&query.sql)?;
        self.history
            .append(question, &query.sql, result.row_count() as u64);
        Ok(Answer { query, result })
    }

    /// Run a hand-written statement once it passes the read-only gate
    pub fn run_sql(&mut self, sql: &str) -> Result<ResultSet> {
        validate_read_only(sql)?;
        let result = self.store.execute(sql)?;
        self.history
            .append(MANUAL_QUERY_LABEL, sql, result.row_count() as u64);
        Ok(result)
    }

    /// Run a recorded query again. Re-runs are not recorded.
    pub fn rerun(&self, index: usize) -> Result<(HistoryRecord, ResultSet)> {
        let record = self
            .history
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("No history entry at position {}", index))?;
        validate_read_only(&record.sql_query)?;
        let result = self.store.execute(&record.sql_query)?;
        Ok((record, result))
    }

    pub async fn suggestions(&mut self) -> Result<Vec<String>> {
        let table = self.ensure_table()?.clone();
        let translator = self.translator()?;
        let schema = self.store.schema(&table)?;
        Ok(translator.suggest_questions(table.as_str(), &schema).await)
    }

    pub async fn explain(&self, sql: &str) -> Result<String> {
        Ok(self.translator()?.explain(sql).await)
    }

    pub fn improvements(&self, sql: &str) -> Vec<&'static str> {
        suggest_improvements(sql)
    }

    fn translator(&self) -> Result<QueryTranslator> {
        self.translator
            .clone()
            .ok_or_else(|| GenerationError::MissingApiKey.into())
    }
}
