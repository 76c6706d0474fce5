//! Purpose: Parse `SELECT * FROM <table> [WHERE <expr>] [LIMIT <n>] [;]` into a `Statement`.
//! Exports: `Statement`, `parse_statement`.
//! Role: Statement-level grammar; the WHERE body is delegated to `predicate::parse_expr`.
//! Invariants: Keywords are case-insensitive; nothing but an optional `;` may follow.
use crate::core::error::Error;
use crate::query::lexer::{unexpected, TokenKind, TokenStream};
use crate::query::predicate::{parse_expr, Predicate};

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub table: String,
    /// Byte offset of the table name, used to locate unknown-table errors.
    pub table_pos: usize,
    pub predicate: Option<Predicate>,
    pub limit: Option<usize>,
}

pub fn parse_statement(sql: &str) -> Result<Statement, Error> {
    let mut tokens = TokenStream::new(sql)?;
    tokens.expect_keyword("SELECT")?;
    tokens.expect(TokenKind::Star, "`*`")?;
    tokens.expect_keyword("FROM")?;

    let table_token = tokens.advance();
    let table = match table_token.kind {
        TokenKind::Word(name) if !is_clause_keyword(&name) => name,
        _ => return Err(unexpected(&table_token, "a table name")),
    };

    let predicate = if tokens.eat_keyword("WHERE") {
        Some(parse_expr(&mut tokens)?)
    } else {
        None
    };

    let limit = if tokens.eat_keyword("LIMIT") {
        let token = tokens.advance();
        match &token.kind {
            TokenKind::Number(text) => Some(text.parse::<usize>().map_err(|_| {
                Error::syntax(token.pos, format!("LIMIT expects a non-negative integer, found {text}"))
            })?),
            _ => return Err(unexpected(&token, "a row count after LIMIT")),
        }
    } else {
        None
    };

    if tokens.peek().kind == TokenKind::Semicolon {
        tokens.advance();
    }
    let trailing = tokens.advance();
    if trailing.kind != TokenKind::End {
        let expected = match (&predicate, limit) {
            (_, Some(_)) => "end of statement",
            (Some(_), None) => "`AND`, `OR`, `LIMIT` or end of statement",
            (None, None) => "`WHERE`, `LIMIT` or end of statement",
        };
        return Err(unexpected(&trailing, expected));
    }

    Ok(Statement {
        table,
        table_pos: table_token.pos,
        predicate,
        limit,
    })
}

fn is_clause_keyword(word: &str) -> bool {
    ["WHERE", "LIMIT", "SELECT", "FROM"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}
