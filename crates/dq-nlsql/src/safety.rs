//! Read-only gate for SQL text
//!
//! The statement is tokenized with the SQLite dialect, so keywords inside
//! string literals or quoted identifiers never trip the gate, and a write
//! hidden after a `;` is caught.

use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use thiserror::Error;

/// Words that may not appear unquoted anywhere in a query
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "CREATE", "ALTER", "TRUNCATE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Query is empty")]
    Empty,

    #[error("Only SELECT queries are allowed")]
    NotSelect,

    #[error("Query contains forbidden keyword {0}")]
    ForbiddenKeyword(String),

    #[error("Only a single statement is allowed")]
    MultipleStatements,

    #[error("Could not read query: {0}")]
    Tokenize(String),
}

/// Accept only a single SELECT statement with no write keywords
pub fn validate_read_only(sql: &str) -> Result<(), ValidationError> {
    if sql.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    let dialect = SQLiteDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| ValidationError::Tokenize(e.to_string()))?;

    let mut first_word = None;
    let mut after_semicolon = false;

    for token in &tokens {
        match token {
            Token::Whitespace(_) | Token::EOF => continue,
            Token::SemiColon => {
                after_semicolon = true;
                continue;
            }
            _ if after_semicolon => return Err(ValidationError::MultipleStatements),
            Token::Word(word) if word.quote_style.is_none() => {
                let upper = word.value.to_ascii_uppercase();
                if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                    return Err(ValidationError::ForbiddenKeyword(upper));
                }
                if first_word.is_none() {
                    first_word = Some(upper);
                }
            }
            _ => {
                if first_word.is_none() {
                    return Err(ValidationError::NotSelect);
                }
            }
        }
    }

    match first_word.as_deref() {
        Some("SELECT") => Ok(()),
        Some(_) => Err(ValidationError::NotSelect),
        None => Err(ValidationError::Empty),
    }
}
