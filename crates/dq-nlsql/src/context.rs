//! Schema context rendering

use std::fmt::Write;

use dq_data::{SqlValue, TableSchema};

/// Sample rows included in a context
const CONTEXT_SAMPLE_ROWS: usize = 3;

/// Describe a table's columns and sample rows as plain text.
///
/// Cell values are not escaped; the output is only read by the generator.
pub fn render(table_name: &str, schema: &TableSchema) -> String {
    let mut context = format!("Table name: {}\n\nColumns:\n", table_name);

    for column in &schema.columns {
        let _ = write!(context, "- {} ({})", column.name, column.declared_type);
        if column.is_primary_key {
            context.push_str(" [PRIMARY KEY]");
        }
        if column.not_null {
            context.push_str(" [NOT NULL]");
        }
        context.push('\n');
    }

    if !schema.sample_rows.is_empty() {
        context.push_str("\nSample data (first few rows):\n");
        let header = schema.column_names().join(" | ");
        context.push_str(&header);
        context.push('\n');
        context.push_str(&"-".repeat(header.chars().count()));
        context.push('\n');

        for row in schema.sample_rows.iter().take(CONTEXT_SAMPLE_ROWS) {
            let cells: Vec<String> = row.iter().map(context_value).collect();
            context.push_str(&cells.join(" | "));
            context.push('\n');
        }
    }

    context
}

fn context_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => format!("{:?}", f),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
