//! Purpose: Define the stable public Rust API boundary for tabula.
//! Exports: `Database` plus the table, store, codec and query types callers compose.
//! Role: Public, additive-only surface used by embedding callers and the CLI.
//! Invariants: Callers reach storage primitives through these re-exports.

mod database;

pub use crate::core::codec::{
    JsonCodec, RowCodec, encode_index_key, sortable_f64, sortable_i64,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::keys::{KeyGenerator, NanoClock, Sequence};
pub use crate::core::log_store::{Durability, LogProvider, LogStore};
pub use crate::core::store::{
    Entry, MemoryProvider, MemoryStore, SCAN_BATCH, SortedStore, StoreProvider, Visitor,
};
pub use crate::core::table::{QueryTarget, Table, TableDef};
pub use crate::core::time_series::{EventTime, TimeSeries, time_key};
pub use crate::core::value::{Literal, RowView, ScalarValue};
pub use crate::query::{Predicate, parse_predicate};
pub use database::{ApiResult, Backend, DEFAULT_QUERY_LIMIT, Database, DatabaseOptions};
