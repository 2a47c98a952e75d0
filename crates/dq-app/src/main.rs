//! Command-line entry point for asking questions about uploaded tables

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dq_core::{history, AppSettings, HistoryRecord};
use dq_data::{display_value, DisplayRows, ResultSet};
use dq_nlsql::{OpenAiGenerator, TextGenerator};

mod session;

use session::Session;

#[derive(Parser)]
#[command(name = "dataquery", version, about = "Ask questions about CSV and Excel data in plain language")]
struct Cli {
    /// SQLite database file (defaults to an in-memory database)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Query history file
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    /// Load a CSV or Excel file before running the command
    #[arg(long = "load", global = true)]
    load: Vec<PathBuf>,

    /// Extra cell value to read as missing (repeatable)
    #[arg(long = "null-marker", global = true)]
    null_markers: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load files into tables
    Load { files: Vec<PathBuf> },

    /// Translate a question to SQL and run it
    Ask {
        question: String,
        #[arg(long)]
        table: Option<String>,
        /// Print the result as CSV
        #[arg(long)]
        csv: bool,
    },

    /// Run a SELECT statement
    Sql {
        query: String,
        #[arg(long)]
        csv: bool,
    },

    /// List tables
    Tables,

    /// Show the schema and sample rows of a table
    Schema { table: String },

    /// Show per-column storage types and samples
    Profile { table: String },

    /// Suggest questions for a table
    Suggest { table: Option<String> },

    /// Explain a query in plain language
    Explain { query: String },

    /// Inspect or manage the query history
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Most recent queries, oldest of them first
    Recent {
        #[arg(default_value_t = 10)]
        n: usize,
    },
    /// Queries whose question or SQL contains a term
    Search { term: String },
    /// Most frequently asked question patterns
    Popular {
        #[arg(default_value_t = 5)]
        n: usize,
    },
    /// Summary statistics as JSON
    Stats,
    /// Remove every entry
    Clear,
    /// Write the history to a JSON file
    Export { path: Option<PathBuf> },
    /// Append entries from a JSON file
    Import { path: PathBuf },
    /// Run a recorded query again
    Rerun { index: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = AppSettings::from_env();
    if let Some(db) = cli.db {
        settings.database_path = db;
    }
    if let Some(path) = cli.history {
        settings.history_path = path;
    }
    settings.extra_null_markers.extend(cli.null_markers);

    let generator = match OpenAiGenerator::new(&settings.generator) {
        Ok(generator) => Some(Arc::new(generator) as Arc<dyn TextGenerator>),
        Err(e) => {
            info!("Text generation unavailable: {}", e);
            None
        }
    };

    let mut session = Session::open(settings, generator)?;
    for path in &cli.load {
        load(&mut session, path)?;
    }

    match cli.command {
        Command::Load { files } => {
            for path in &files {
                load(&mut session, path)?;
            }
        }
        Command::Ask { question, table, csv } => {
            if let Some(table) = table {
                session.select_table(&table)?;
            }
            let answer = session.ask(&question).await?;
            println!("-- {}\n{}\n", answer.query.question, answer.query.sql);
            print_result(&session, &answer.result, csv)?;
        }
        Command::Sql { query, csv } => {
            let result = session.run_sql(&query)?;
            print_result(&session, &result, csv)?;
            for hint in session.improvements(&query) {
                println!("hint: {}", hint);
            }
        }
        Command::Tables => {
            let current = session.current_table().map(|t| t.to_string());
            for table in session.tables()? {
                let marker = if current.as_deref() == Some(table.as_str()) { "*" } else { " " };
                println!("{} {}", marker, table);
            }
        }
        Command::Schema { table } => {
            let schema = session.schema(&table)?;
            println!("{}", dq_nlsql::render(&table, &schema));
        }
        Command::Profile { table } => {
            let profile = session.profile(&table)?;
            println!(
                "{}: {} rows, {} columns",
                profile.table_name,
                profile.row_count,
                profile.column_count()
            );
            for column in &profile.columns {
                let samples: Vec<String> = column.sample_values.iter().map(display_value).collect();
                println!(
                    "  {} [{}] e.g. {}",
                    column.name,
                    column.storage_types.join(", "),
                    samples.join(", ")
                );
            }
        }
        Command::Suggest { table } => {
            if let Some(table) = table {
                session.select_table(&table)?;
            }
            for (i, question) in session.suggestions().await?.iter().enumerate() {
                println!("{}. {}", i + 1, question);
            }
        }
        Command::Explain { query } => {
            println!("{}", session.explain(&query).await?);
        }
        Command::History(command) => run_history(&mut session, command)?,
    }

    Ok(())
}

fn load(session: &mut Session, path: &std::path::Path) -> Result<()> {
    let table = session.load_file(path)?;
    println!(
        "Loaded {} as '{}' ({} rows, {} columns)",
        path.display(),
        table.name(),
        table.row_count(),
        table.column_count()
    );
    for column in table.columns() {
        println!("  {} ({})", column.name, column.kind());
    }
    Ok(())
}

fn run_history(session: &mut Session, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::Recent { n } => print_records(session.history().recent(n)),
        HistoryCommand::Search { term } => print_records(session.history().search(&term)),
        HistoryCommand::Popular { n } => print_records(session.history().popular(n)),
        HistoryCommand::Stats => {
            let stats = session.history().statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        HistoryCommand::Clear => {
            session.history_mut().clear();
            println!("History cleared");
        }
        HistoryCommand::Export { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(history::default_export_file_name()));
            session.history().export(&path)?;
            println!("Exported history to {}", path.display());
        }
        HistoryCommand::Import { path } => {
            let imported = session.history_mut().import(&path)?;
            println!("Imported {} entries", imported);
        }
        HistoryCommand::Rerun { index } => {
            let (record, result) = session.rerun(index)?;
            println!("-- {}\n{}\n", record.question, record.sql_query);
            print_result(session, &result, false)?;
        }
    }
    Ok(())
}

fn print_records(records: Vec<&HistoryRecord>) {
    if records.is_empty() {
        println!("No queries recorded");
    }
    for record in records {
        println!(
            "[{}] {} ({} rows)\n    {}",
            record.timestamp, record.question, record.result_count, record.sql_query
        );
    }
}

fn print_result(session: &Session, result: &ResultSet, csv: bool) -> Result<()> {
    if csv {
        print!("{}", result.to_csv()?);
        return Ok(());
    }

    if result.is_empty() {
        println!("Query returned no results");
        return Ok(());
    }

    let shown = result.display(session.settings().max_display_rows);
    print!("{}", render_rows(&shown));
    if shown.truncated() {
        warn!("Showing first {} of {} rows", shown.rows.len(), shown.total_rows);
    }
    println!("({} rows)", shown.total_rows);
    Ok(())
}

/// Header line plus one pipe-separated line per row
fn render_rows(shown: &DisplayRows) -> String {
    let mut out = shown.columns.join(" | ");
    out.push('\n');
    for row in &shown.rows {
        out.push_str(&row.join(" | "));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dq_data::SqlValue;

    #[test]
    fn test_render_rows_capped() {
        let result = ResultSet {
            columns: vec!["name".to_string(), "score".to_string()],
            rows: vec![
                vec![SqlValue::Text("a".to_string()), SqlValue::Real(1.234)],
                vec![SqlValue::Null, SqlValue::Integer(2)],
                vec![SqlValue::Text("c".to_string()), SqlValue::Integer(3)],
            ],
        };

        let shown = result.display(2);
        assert!(shown.truncated());
        assert_eq!(render_rows(&shown), "name | score\na | 1.23\nNULL | 2\n");
    }

    #[test]
    fn test_cli_parses_history_rerun() {
        let cli = Cli::try_parse_from(["dataquery", "--load", "a.csv", "history", "rerun", "3"]).unwrap();
        assert_eq!(cli.load, vec![PathBuf::from("a.csv")]);
        assert!(matches!(
            cli.command,
            Command::History(HistoryCommand::Rerun { index: 3 })
        ));
    }
}
