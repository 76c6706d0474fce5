//! Purpose: Embeddable tabular key-value store with secondary indexes and a SQL subset.
//! Exports: `api` (public surface), `core` (stores, codecs, tables, errors), `query`.
//! Role: Library backing the `tabula` CLI and embedding callers.
//! Invariants: All storage flows through the `SortedStore` contract.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod query;
