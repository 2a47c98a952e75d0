//! Natural-language to SQL translation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dq_data::TableSchema;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context;
use crate::generator::{GenerationError, GenerationRequest, TextGenerator};

const MAX_SUGGESTIONS: usize = 5;

const SQL_SYSTEM_INSTRUCTION: &str = "You are an expert SQL developer. Generate accurate SQL queries \
based on natural language questions. Always return valid SQLite-compatible SQL queries. Return only \
the SQL query without any explanation or markdown formatting.";

const SUGGEST_SYSTEM_INSTRUCTION: &str = "You are a business intelligence expert. Generate practical \
analytical questions that would provide business insights. Return only a JSON object of the form \
{\"suggestions\": [\"question\", ...]}.";

const EXPLAIN_SYSTEM_INSTRUCTION: &str =
    "You are a data analyst who explains SQL queries in business terms. Be clear and concise.";

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("Error converting natural language to SQL: {0}")]
    Generation(#[from] GenerationError),

    #[error("Generated response contained no SQL")]
    EmptyResponse,
}

/// SQL produced for a question
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub question: String,
    pub sql: String,
    pub issued_at: DateTime<Utc>,
}

/// Builds generation requests and cleans up what comes back
#[derive(Clone)]
pub struct QueryTranslator {
    generator: Arc<dyn TextGenerator>,
}

impl QueryTranslator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Translate a question into a single SQL statement.
    ///
    /// The remote call is made once; any failure is returned as is.
    pub async fn generate_sql(
        &self,
        question: &str,
        table_name: &str,
        schema: &TableSchema,
    ) -> Result<GeneratedQuery, TranslationError> {
        let table_context = context::render(table_name, schema);
        let request = GenerationRequest {
            system_instruction: SQL_SYSTEM_INSTRUCTION.to_string(),
            user_instruction: sql_prompt(question, &table_context),
            temperature: 0.1,
            max_output_tokens: Some(500),
            structured_output: false,
        };

        let raw = self.generator.generate(&request).await?;
        debug!("Raw generated SQL: {}", raw);

        let sql = clean_sql(&raw).ok_or(TranslationError::EmptyResponse)?;
        info!("Generated SQL for '{}': {}", question, sql);

        Ok(GeneratedQuery {
            question: question.to_string(),
            sql,
            issued_at: Utc::now(),
        })
    }

    /// Up to five analytical questions about the table. Never fails.
    pub async fn suggest_questions(&self, table_name: &str, schema: &TableSchema) -> Vec<String> {
        let table_context = context::render(table_name, schema);
        let request = GenerationRequest {
            system_instruction: SUGGEST_SYSTEM_INSTRUCTION.to_string(),
            user_instruction: format!(
                "Based on this table schema, suggest 5 useful analytical questions that a business \
                 analyst might ask:\n\n{}\n\nReturn the suggestions as a JSON object with a \
                 \"suggestions\" array of strings. Each suggestion should be a natural language question.",
                table_context
            ),
            temperature: 0.3,
            max_output_tokens: None,
            structured_output: true,
        };

        match self.generator.generate(&request).await {
            Ok(raw) => {
                let suggestions = parse_suggestions(&raw);
                if suggestions.is_empty() {
                    warn!("No usable suggestions in response; using defaults");
                    fallback_questions(table_name)
                } else {
                    suggestions
                }
            }
            Err(e) => {
                warn!("Suggestion request failed: {}", e);
                fallback_questions(table_name)
            }
        }
    }

    /// Plain-language explanation of a query. Failures become a message.
    pub async fn explain(&self, sql: &str) -> String {
        let request = GenerationRequest {
            system_instruction: EXPLAIN_SYSTEM_INSTRUCTION.to_string(),
            user_instruction: format!(
                "Explain this SQL query in simple terms that a business analyst would understand:\n\n\
                 {}\n\nProvide a clear, concise explanation of what this query does and what results \
                 it will return.",
                sql
            ),
            temperature: 0.2,
            max_output_tokens: Some(200),
            structured_output: false,
        };

        match self.generator.generate(&request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("Explanation request failed: {}", e);
                format!("Unable to explain query: {}", e)
            }
        }
    }
}

fn sql_prompt(question: &str, table_context: &str) -> String {
    format!(
        "Convert this natural language question into a SQL query:\n\
         \n\
         Question: \"{question}\"\n\
         \n\
         Database context:\n\
         {table_context}\n\
         Requirements:\n\
         1. Generate valid SQLite-compatible SQL\n\
         2. Use appropriate WHERE clauses, JOINs, GROUP BY, ORDER BY as needed\n\
         3. Include LIMIT clauses for large result sets (default to 100 if not specified)\n\
         4. Handle null values appropriately\n\
         5. Use proper column names and table names as provided\n\
         6. For aggregation questions, use appropriate aggregate functions (COUNT, SUM, AVG, etc.)\n\
         7. For \"top N\" questions, use ORDER BY with LIMIT\n\
         8. For trend analysis, consider using date/time columns if available\n\
         \n\
         Return only the SQL query without any explanation or formatting."
    )
}

/// Strip fences, blank lines and comment lines, then join what is left into
/// one statement ending in `;`. Returns `None` when nothing is left.
///
/// A line opening with a fence is dropped whole, language tag included.
pub fn clean_sql(raw: &str) -> Option<String> {
    let lines: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| line.replace("```", "").trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with("--") && !line.starts_with('#'))
        .collect();

    let mut sql = lines.join(" ");
    if sql.trim_end_matches(';').trim().is_empty() {
        return None;
    }
    if !sql.ends_with(';') {
        sql.push(';');
    }
    Some(sql)
}

/// Read suggestions from `{"suggestions": [...]}`, `{"questions": [...]}`
/// or a bare array
fn parse_suggestions(raw: &str) -> Vec<String> {
    let value: Value = match serde_json::from_str(raw.trim()) {
        Ok(value) => value,
        Err(e) => {
            warn!("Suggestions were not valid JSON: {}", e);
            return Vec::new();
        }
    };

    let items = match &value {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["suggestions", "questions"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    };

    items
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .take(MAX_SUGGESTIONS)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Fixed questions used when the generator cannot help
pub fn fallback_questions(table_name: &str) -> Vec<String> {
    vec![
        format!("What are the top 10 records in {}?", table_name),
        format!("Show me the summary statistics for {}", table_name),
        format!("What is the distribution of values in {}?", table_name),
        format!("Find any trends or patterns in {}", table_name),
        format!("What are the most common values in {}?", table_name),
    ]
}
