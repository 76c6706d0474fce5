// Tokenizer for the SELECT subset; every token records its starting byte offset.
use crate::core::error::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword; keywords are matched case-insensitively by the parser.
    Word(String),
    Number(String),
    Str(String),
    Star,
    Equals,
    LParen,
    RParen,
    Semicolon,
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

impl Token {
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Word(word) => format!("`{word}`"),
            TokenKind::Number(number) => format!("number {number}"),
            TokenKind::Str(text) => format!("string '{text}'"),
            TokenKind::Star => "`*`".to_string(),
            TokenKind::Equals => "`=`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::Semicolon => "`;`".to_string(),
            TokenKind::End => "end of input".to_string(),
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(word) if word.eq_ignore_ascii_case(keyword))
    }
}

/// Splits `input` into tokens, always ending with a `TokenKind::End` at `input.len()`.
pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let byte = bytes[pos];
        let start = pos;
        let kind = match byte {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'*' => {
                pos += 1;
                TokenKind::Star
            }
            b'=' => {
                pos += 1;
                TokenKind::Equals
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            b'\'' => {
                let (text, next) = read_string(input, start)?;
                pos = next;
                TokenKind::Str(text)
            }
            b'-' | b'.' | b'0'..=b'9' => {
                pos = read_number(bytes, start)?;
                TokenKind::Number(input[start..pos].to_string())
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                TokenKind::Word(input[start..pos].to_string())
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('?');
                return Err(Error::syntax(start, format!("unexpected character `{ch}`")));
            }
        };
        tokens.push(Token { kind, pos: start });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        pos: input.len(),
    });
    Ok(tokens)
}

/// Cursor over a token list produced by [`tokenize`].
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    next: usize,
}

impl TokenStream {
    pub fn new(input: &str) -> Result<Self, Error> {
        Ok(Self {
            tokens: tokenize(input)?,
            next: 0,
        })
    }

    pub fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.next.min(last)]
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.next += 1;
        }
        token
    }

    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.advance();
            return true;
        }
        false
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> Result<Token, Error> {
        let token = self.advance();
        if token.is_keyword(keyword) {
            return Ok(token);
        }
        Err(unexpected(&token, &format!("`{}`", keyword.to_ascii_uppercase())))
    }

    pub fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, Error> {
        let token = self.advance();
        if token.kind == kind {
            return Ok(token);
        }
        Err(unexpected(&token, what))
    }
}

pub fn unexpected(token: &Token, expected: &str) -> Error {
    Error::syntax(
        token.pos,
        format!("expected {expected}, found {}", token.describe()),
    )
}

/// Reads a single-quoted string starting at `start`; `''` encodes a quote.
fn read_string(input: &str, start: usize) -> Result<(String, usize), Error> {
    let bytes = input.as_bytes();
    let mut text = String::new();
    let mut pos = start + 1;
    let mut chunk_start = pos;
    loop {
        match bytes.get(pos) {
            None => return Err(Error::syntax(start, "unterminated string literal")),
            Some(b'\'') if bytes.get(pos + 1) == Some(&b'\'') => {
                text.push_str(&input[chunk_start..pos]);
                text.push('\'');
                pos += 2;
                chunk_start = pos;
            }
            Some(b'\'') => {
                text.push_str(&input[chunk_start..pos]);
                return Ok((text, pos + 1));
            }
            Some(_) => pos += 1,
        }
    }
}

fn read_number(bytes: &[u8], start: usize) -> Result<usize, Error> {
    let mut pos = start;
    if bytes[pos] == b'-' {
        pos += 1;
    }
    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let mut digits = pos - int_start;
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        let frac_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        digits += pos - frac_start;
    }
    if digits == 0 {
        return Err(Error::syntax(start, "malformed number"));
    }
    if pos < bytes.len() && (bytes[pos].is_ascii_alphabetic() || bytes[pos] == b'_') {
        return Err(Error::syntax(pos, "malformed number"));
    }
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::{tokenize, TokenKind};
    use crate::core::error::ErrorKind;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn select_statement_tokens() {
        assert_eq!(
            kinds("select * From orders where orderId=100"),
            vec![
                TokenKind::Word("select".into()),
                TokenKind::Star,
                TokenKind::Word("From".into()),
                TokenKind::Word("orders".into()),
                TokenKind::Word("where".into()),
                TokenKind::Word("orderId".into()),
                TokenKind::Equals,
                TokenKind::Number("100".into()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("a = 'x'").expect("tokenize");
        let positions: Vec<usize> = tokens.iter().map(|token| token.pos).collect();
        assert_eq!(positions, vec![0, 2, 4, 7]);
    }

    #[test]
    fn strings_numbers_and_escapes() {
        assert_eq!(
            kinds("'it''s' -3.5 .5 (x)"),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Number("-3.5".into()),
                TokenKind::Number(".5".into()),
                TokenKind::LParen,
                TokenKind::Word("x".into()),
                TokenKind::RParen,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn lexical_errors_carry_position() {
        let err = tokenize("status = 'open").expect_err("unterminated");
        assert_eq!(err.kind(), ErrorKind::QuerySyntax);
        assert_eq!(err.position(), Some(9));

        let err = tokenize("a = #").expect_err("bad char");
        assert_eq!(err.position(), Some(4));

        let err = tokenize("limit 12ab").expect_err("bad number");
        assert_eq!(err.position(), Some(8));

        let err = tokenize("x = -").expect_err("lone minus");
        assert_eq!(err.position(), Some(4));
    }
}
