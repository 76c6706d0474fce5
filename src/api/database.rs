//! Purpose: Table registry that owns the storage backend and runs SQL against registered tables.
//! Exports: `Database`, `DatabaseOptions`, `Backend`.
//! Role: Public entry point for embedding callers and the CLI.
//! Invariants: Table names are unique within a database; registration is all-or-nothing.
//! Invariants: After `close`, every operation fails with `ErrorKind::Closed`.
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::log_store::{Durability, LogProvider};
use crate::core::store::{MemoryProvider, StoreProvider};
use crate::core::table::{QueryTarget, Table, TableDef};
use crate::core::value::RowView;
use crate::query::engine::{self, Catalog};

pub type ApiResult<T> = Result<T, Error>;

/// Default row cap for statements without a LIMIT clause.
pub const DEFAULT_QUERY_LIMIT: usize = 10_000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Backend {
    /// Process-memory stores; contents vanish on close.
    Memory,
    /// One append-only log file per store under `dir`.
    Log { dir: PathBuf },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DatabaseOptions {
    default_limit: usize,
    durability: Durability,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
            durability: Durability::Fast,
        }
    }

    pub fn with_default_limit(mut self, default_limit: usize) -> Self {
        self.default_limit = default_limit;
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Database {
    provider: Box<dyn StoreProvider>,
    options: DatabaseOptions,
    tables: RwLock<BTreeMap<String, Arc<dyn QueryTarget>>>,
    closed: AtomicBool,
}

impl Database {
    pub fn open(backend: Backend, options: DatabaseOptions) -> ApiResult<Self> {
        let provider: Box<dyn StoreProvider> = match backend {
            Backend::Memory => Box::new(MemoryProvider),
            Backend::Log { dir } => {
                fs::create_dir_all(&dir).map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to create database directory")
                        .with_path(&dir)
                        .with_source(err)
                })?;
                Box::new(LogProvider::new(dir, options.durability))
            }
        };
        Ok(Self::with_provider(provider, options))
    }

    /// Uses a caller-supplied backend.
    pub fn with_provider(provider: Box<dyn StoreProvider>, options: DatabaseOptions) -> Self {
        Self {
            provider,
            options,
            tables: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> DatabaseOptions {
        self.options
    }

    /// Opens the table's stores and registers it under `def.name()`.
    pub fn create_table<R: 'static>(&self, def: TableDef<R>) -> ApiResult<Arc<Table<R>>> {
        self.ensure_open()?;
        let mut tables = self.tables.write().map_err(|_| lock_error())?;
        if tables.contains_key(def.name()) {
            return Err(Error::new(ErrorKind::DuplicateTable)
                .with_message(format!("table `{}` is already registered", def.name()))
                .with_table(def.name()));
        }

        let table = Arc::new(Table::open(def, self.provider.as_ref())?);
        let name = table.name().to_string();
        info!(
            table = %name,
            columns = table.desc().len(),
            indexes = table.index_names().len(),
            "table created"
        );
        tables.insert(name, table.clone() as Arc<dyn QueryTarget>);
        Ok(table)
    }

    /// Registered table names in ascending order.
    pub fn table_names(&self) -> ApiResult<Vec<String>> {
        self.ensure_open()?;
        let tables = self.tables.read().map_err(|_| lock_error())?;
        Ok(tables.keys().cloned().collect())
    }

    /// Column names of `table` in declared order.
    pub fn desc(&self, table: &str) -> ApiResult<Vec<String>> {
        Ok(self.lookup(table)?.columns())
    }

    /// Runs `sql`, handing each matching row to `on_row`; returns the delivered count.
    pub fn execute(&self, sql: &str, mut on_row: impl FnMut(RowView)) -> ApiResult<usize> {
        self.execute_with(sql, |row| {
            on_row(row);
            Ok(())
        })
    }

    /// Like [`Database::execute`] for sinks that can fail; a sink error stops delivery.
    pub fn execute_with(
        &self,
        sql: &str,
        mut on_row: impl FnMut(RowView) -> Result<(), Error>,
    ) -> ApiResult<usize> {
        self.ensure_open()?;
        engine::execute(self, sql, self.options.default_limit, &mut on_row)
    }

    pub fn execute_collect(&self, sql: &str) -> ApiResult<Vec<RowView>> {
        let mut rows = Vec::new();
        self.execute(sql, |row| rows.push(row))?;
        Ok(rows)
    }

    /// Closes every registered table; later calls fail with `Closed`. Closing twice is a no-op.
    pub fn close(&self) -> ApiResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let tables = std::mem::take(&mut *self.tables.write().map_err(|_| lock_error())?);
        let mut first_err = None;
        for table in tables.values() {
            if let Err(err) = table.close() {
                first_err.get_or_insert(err);
            }
        }
        debug!(tables = tables.len(), "database closed");
        first_err.map_or(Ok(()), Err)
    }

    fn lookup(&self, table: &str) -> ApiResult<Arc<dyn QueryTarget>> {
        self.ensure_open()?;
        self.target(table).ok_or_else(|| {
            Error::new(ErrorKind::UnknownTable)
                .with_message(format!("no table named `{table}`"))
                .with_table(table)
        })
    }

    fn ensure_open(&self) -> ApiResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::Closed).with_message("database is closed"));
        }
        Ok(())
    }
}

impl Catalog for Database {
    fn target(&self, name: &str) -> Option<Arc<dyn QueryTarget>> {
        let tables = self.tables.read().ok()?;
        tables.get(name).cloned()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "close on drop failed");
        }
    }
}

fn lock_error() -> Error {
    Error::new(ErrorKind::Internal).with_message("table registry lock poisoned")
}
