//! Purpose: Parse WHERE expressions into an immutable predicate tree and evaluate it per row.
//! Exports: `Predicate`, `parse_predicate`, `parse_expr`.
//! Role: The only filtering logic in query execution; a direct tree walk, no compilation.
//! Invariants: `AND`/`OR` share one precedence level and associate left-to-right;
//! parentheses alone decide grouping.
//! Invariants: Evaluation short-circuits; an unknown column evaluates to false.
use std::fmt;

use crate::core::error::Error;
use crate::core::value::{Literal, RowView};
use crate::query::lexer::{unexpected, TokenKind, TokenStream};

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Equals {
        column: String,
        literal: Literal,
        /// Byte offset of the column name in the query text.
        pos: usize,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn equals(column: impl Into<String>, literal: Literal) -> Self {
        Predicate::Equals {
            column: column.into(),
            literal,
            pos: 0,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn evaluate(&self, row: &RowView) -> bool {
        match self {
            Predicate::Equals {
                column, literal, ..
            } => row
                .get(column)
                .is_some_and(|value| value.matches(literal)),
            Predicate::And(left, right) => left.evaluate(row) && right.evaluate(row),
            Predicate::Or(left, right) => left.evaluate(row) || right.evaluate(row),
        }
    }

    /// Visits every `Equals` leaf as `(column, pos)`, left to right.
    pub fn for_each_column(&self, visit: &mut dyn FnMut(&str, usize)) {
        match self {
            Predicate::Equals { column, pos, .. } => visit(column, *pos),
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.for_each_column(visit);
                right.for_each_column(visit);
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals {
                column, literal, ..
            } => write!(f, "{column}={literal}"),
            Predicate::And(left, right) => write!(f, "({left} AND {right})"),
            Predicate::Or(left, right) => write!(f, "({left} OR {right})"),
        }
    }
}

/// Parses a standalone WHERE expression (no `WHERE` keyword).
pub fn parse_predicate(input: &str) -> Result<Predicate, Error> {
    let mut tokens = TokenStream::new(input)?;
    let predicate = parse_expr(&mut tokens)?;
    let trailing = tokens.advance();
    if trailing.kind != TokenKind::End {
        return Err(unexpected(&trailing, "`AND`, `OR` or end of input"));
    }
    Ok(predicate)
}

/// `expr := term (("AND" | "OR") term)*`
pub fn parse_expr(tokens: &mut TokenStream) -> Result<Predicate, Error> {
    let mut left = parse_term(tokens)?;
    loop {
        if tokens.eat_keyword("AND") {
            left = left.and(parse_term(tokens)?);
        } else if tokens.eat_keyword("OR") {
            left = left.or(parse_term(tokens)?);
        } else {
            return Ok(left);
        }
    }
}

/// `term := "(" expr ")" | column "=" literal`
fn parse_term(tokens: &mut TokenStream) -> Result<Predicate, Error> {
    let token = tokens.advance();
    match token.kind {
        TokenKind::LParen => {
            let inner = parse_expr(tokens)?;
            tokens.expect(TokenKind::RParen, "`)`")?;
            Ok(inner)
        }
        TokenKind::Word(column) if !is_reserved(&column) => {
            tokens.expect(TokenKind::Equals, "`=`")?;
            let literal_token = tokens.advance();
            let literal = match literal_token.kind {
                TokenKind::Str(text) => Literal::Text(text),
                TokenKind::Number(number) => Literal::Number(number),
                _ => return Err(unexpected(&literal_token, "a quoted string or number")),
            };
            Ok(Predicate::Equals {
                column,
                literal,
                pos: token.pos,
            })
        }
        _ => Err(unexpected(&token, "a column name or `(`")),
    }
}

fn is_reserved(word: &str) -> bool {
    ["AND", "OR", "WHERE", "LIMIT", "SELECT", "FROM"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

#[cfg(test)]
mod tests {
    use super::{parse_predicate, Predicate};
    use crate::core::error::ErrorKind;
    use crate::core::value::{Literal, RowView, ScalarValue};

    fn row(order_id: i64, status: &str, order_date: i64) -> RowView {
        RowView::new(
            order_id.to_string(),
            vec![
                ("orderId".to_string(), ScalarValue::Int(order_id)),
                ("status".to_string(), ScalarValue::from(status)),
                ("orderDate".to_string(), ScalarValue::Int(order_date)),
            ],
        )
    }

    #[test]
    fn operators_associate_left_to_right() {
        let parsed = parse_predicate("a=1 OR b=2 AND c=3").expect("parse");
        assert_eq!(parsed.to_string(), "((a=1 OR b=2) AND c=3)");

        let grouped = parse_predicate("a=1 OR (b=2 AND c=3)").expect("parse");
        assert_eq!(grouped.to_string(), "(a=1 OR (b=2 AND c=3))");
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let parsed = parse_predicate("orderId=101 and customerId='2'").expect("parse");
        let expected = Predicate::equals("orderId", Literal::Number("101".into()))
            .and(Predicate::equals("customerId", Literal::Text("2".into())));
        assert_eq!(parsed.to_string(), expected.to_string());
    }

    #[test]
    fn nested_condition_evaluates() {
        let predicate =
            parse_predicate("(status='PENDING' or status='SHIPPED') AND (orderdate=20200902)")
                .expect("parse");
        assert!(!predicate.evaluate(&row(100, "SHIPPED", 20200901)));
        assert!(predicate.evaluate(&row(101, "SHIPPED", 20200902)));
        assert!(!predicate.evaluate(&row(102, "PENDING", 20200903)));
    }

    #[test]
    fn unknown_column_is_false() {
        let predicate = parse_predicate("nope=1 OR orderId=100").expect("parse");
        assert!(predicate.evaluate(&row(100, "SHIPPED", 1)));
        assert!(!predicate.evaluate(&row(101, "SHIPPED", 1)));
    }

    #[test]
    fn collects_columns_with_positions() {
        let predicate = parse_predicate("a=1 AND (bb='x' OR c=2)").expect("parse");
        let mut seen = Vec::new();
        predicate.for_each_column(&mut |column, pos| seen.push((column.to_string(), pos)));
        assert_eq!(
            seen,
            vec![("a".to_string(), 0), ("bb".to_string(), 9), ("c".to_string(), 19)]
        );
    }

    #[test]
    fn syntax_errors_point_at_offending_token() {
        let cases = [
            ("(status=", 8),
            ("(a=1", 4),
            ("a=1)", 3),
            ("a 1", 2),
            ("a=b", 2),
            ("=1", 0),
            ("a=1 AND", 7),
            ("a=1 b=2", 4),
        ];
        for (input, position) in cases {
            let err = parse_predicate(input).expect_err(input);
            assert_eq!(err.kind(), ErrorKind::QuerySyntax, "{input}");
            assert_eq!(err.position(), Some(position), "{input}");
        }
    }
}
