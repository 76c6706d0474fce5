// Query surface: tokenizer, statement and WHERE parsers, and the scan-based executor.
pub mod engine;
pub mod lexer;
pub mod predicate;
pub mod statement;

pub use engine::{execute, Catalog};
pub use predicate::{parse_predicate, Predicate};
pub use statement::{parse_statement, Statement};
