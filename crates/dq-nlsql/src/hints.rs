//! Advisory hints for hand-written or generated queries

use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

pub const HINT_ADD_LIMIT: &str = "Consider adding a LIMIT clause to prevent large result sets";
pub const HINT_ADD_WHERE: &str = "Consider adding a WHERE clause to filter results";
pub const HINT_ADD_ORDER_BY: &str = "Consider adding ORDER BY clause when using LIMIT or TOP";

/// Suggest improvements to a query. Unreadable SQL yields no hints.
pub fn suggest_improvements(sql: &str) -> Vec<&'static str> {
    let dialect = SQLiteDialect {};
    let tokens: Vec<Token> = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .collect(),
        Err(_) => return Vec::new(),
    };

    let has_word = |keyword: &str| tokens.iter().any(|t| is_keyword(t, keyword));
    let has_pair = |first: &str, second: &str| {
        tokens.windows(2).any(|w| is_keyword(&w[0], first) && is_keyword(&w[1], second))
    };
    let select_star = tokens
        .windows(2)
        .any(|w| is_keyword(&w[0], "SELECT") && matches!(w[1], Token::Mul));

    let has_limit = has_word("LIMIT");
    let mut hints = Vec::new();

    if !has_limit {
        hints.push(HINT_ADD_LIMIT);
    }
    if select_star && !has_word("WHERE") {
        hints.push(HINT_ADD_WHERE);
    }
    if (has_limit || has_word("TOP")) && !has_pair("ORDER", "BY") {
        hints.push(HINT_ADD_ORDER_BY);
    }

    hints
}

fn is_keyword(token: &Token, keyword: &str) -> bool {
    match token {
        Token::Word(word) => word.quote_style.is_none() && word.value.eq_ignore_ascii_case(keyword),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_select_star() {
        assert_eq!(
            suggest_improvements("SELECT * FROM t"),
            vec![HINT_ADD_LIMIT, HINT_ADD_WHERE]
        );
    }

    #[test]
    fn test_limit_without_order() {
        assert_eq!(
            suggest_improvements("SELECT name FROM t WHERE x > 1 LIMIT 5"),
            vec![HINT_ADD_ORDER_BY]
        );
    }

    #[test]
    fn test_well_formed_query() {
        assert!(suggest_improvements("SELECT * FROM t WHERE a = 1 ORDER BY a LIMIT 10;").is_empty());
    }

    #[test]
    fn test_keywords_in_literals_ignored() {
        let hints = suggest_improvements("SELECT 'limit' FROM t");
        assert_eq!(hints, vec![HINT_ADD_LIMIT]);
    }
}
