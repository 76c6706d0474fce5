//! Purpose: Crate-wide error type shared by storage, table, and query layers.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: One builder-style error carrying a kind plus optional location context.
//! Invariants: `QuerySyntax` errors always carry the byte offset of the offending token.
//! Invariants: Backend I/O failures keep their original `io::Error` as `source`.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    DuplicateTable,
    UnknownTable,
    UnknownIndex,
    QuerySyntax,
    PartialWrite,
    Codec,
    Closed,
    Corrupt,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    table: Option<String>,
    index: Option<String>,
    position: Option<usize>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            table: None,
            index: None,
            position: None,
            path: None,
            source: None,
        }
    }

    /// Syntax error pinned to the byte offset where parsing gave up.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuerySyntax)
            .with_message(message)
            .with_position(position)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Keeps an already-built crate error as the cause of a wrapping one.
    pub(crate) fn with_cause(mut self, cause: Error) -> Self {
        self.source = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {table})")?;
        }
        if let Some(index) = &self.index {
            write!(f, " (index: {index})")?;
        }
        if let Some(position) = self.position {
            write!(f, " (position: {position})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::DuplicateTable => 3,
        ErrorKind::UnknownTable => 4,
        ErrorKind::UnknownIndex => 5,
        ErrorKind::QuerySyntax => 6,
        ErrorKind::PartialWrite => 7,
        ErrorKind::Codec => 8,
        ErrorKind::Closed => 9,
        ErrorKind::Corrupt => 10,
        ErrorKind::Io => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::{to_exit_code, Error, ErrorKind};
    use std::error::Error as _;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::DuplicateTable, 3),
            (ErrorKind::UnknownTable, 4),
            (ErrorKind::UnknownIndex, 5),
            (ErrorKind::QuerySyntax, 6),
            (ErrorKind::PartialWrite, 7),
            (ErrorKind::Codec, 8),
            (ErrorKind::Closed, 9),
            (ErrorKind::Corrupt, 10),
            (ErrorKind::Io, 11),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_context() {
        let err = Error::syntax(27, "expected literal").with_table("orders");
        let text = err.to_string();
        assert!(text.starts_with("QuerySyntax: expected literal"));
        assert!(text.contains("(table: orders)"));
        assert!(text.contains("(position: 27)"));
    }

    #[test]
    fn source_chain_is_preserved() {
        let io = std::io::Error::other("disk gone");
        let err = Error::new(ErrorKind::Io).with_source(io);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk gone"));

        let wrapped = Error::new(ErrorKind::PartialWrite).with_cause(err);
        let cause = wrapped.source().expect("cause");
        assert!(cause.to_string().starts_with("Io"));
    }
}
