//! Purpose: Typed tables over a primary sorted store plus one sorted store per secondary index.
//! Exports: `TableDef`, `Table`, `QueryTarget`, `ColumnFn`, `IndexFn`.
//! Role: Projects caller rows into column/index values via registered extractor functions.
//! Invariants: Each row in the primary store has exactly one entry in every index store.
//! Invariants: Inserts stage every index key before the first write; a failed index write
//! rolls back what was written and surfaces `PartialWrite`.
//! Invariants: Scans deliver rows in ascending primary-key order; `match` in ascending
//! composite-index order.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::codec::{self, JsonCodec, RowCodec};
use crate::core::error::{Error, ErrorKind};
use crate::core::keys::{KeyGenerator, NanoClock};
use crate::core::store::{SortedStore, StoreProvider};
use crate::core::value::{RowView, ScalarValue};

pub type ColumnFn<R> = Box<dyn Fn(&R) -> ScalarValue + Send + Sync>;
pub type IndexFn<R> = Box<dyn Fn(&R) -> String + Send + Sync>;

/// Schema for one table: extractors, key generator, and row codec.
pub struct TableDef<R> {
    name: String,
    columns: Vec<(String, ColumnFn<R>)>,
    indexes: Vec<(String, IndexFn<R>)>,
    keys: Box<dyn KeyGenerator>,
    codec: Box<dyn RowCodec<R>>,
}

impl<R: Serialize + DeserializeOwned + 'static> TableDef<R> {
    /// Rows are stored as JSON.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_codec(name, JsonCodec::<R>::new())
    }
}

impl<R> TableDef<R> {
    pub fn with_codec(name: impl Into<String>, codec: impl RowCodec<R> + 'static) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            keys: Box::new(NanoClock::new()),
            codec: Box::new(codec),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column<V, F>(mut self, name: impl Into<String>, extract: F) -> Self
    where
        V: Into<ScalarValue>,
        F: Fn(&R) -> V + Send + Sync + 'static,
    {
        self.columns
            .push((name.into(), Box::new(move |row: &R| extract(row).into())));
        self
    }

    pub fn index<F>(mut self, name: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&R) -> String + Send + Sync + 'static,
    {
        self.indexes.push((name.into(), Box::new(extract)));
        self
    }

    pub fn key_generator(mut self, keys: impl KeyGenerator + 'static) -> Self {
        self.keys = Box::new(keys);
        self
    }

    fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name, "table")?;
        for (position, (name, _)) in self.columns.iter().enumerate() {
            if name.is_empty() {
                return Err(usage("column names must be non-empty", &self.name));
            }
            if self.columns[..position]
                .iter()
                .any(|(other, _)| other.eq_ignore_ascii_case(name))
            {
                return Err(usage(format!("duplicate column `{name}`"), &self.name));
            }
        }
        for (position, (name, _)) in self.indexes.iter().enumerate() {
            validate_name(name, "index").map_err(|err| err.with_table(&self.name))?;
            if self.indexes[..position].iter().any(|(other, _)| other == name) {
                return Err(usage(format!("duplicate index `{name}`"), &self.name));
            }
        }
        Ok(())
    }
}

/// Names must also lex as one SQL identifier so every table stays queryable.
fn validate_name(name: &str, what: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid {what} name `{name}`"))
            .with_hint("Start with an ASCII letter or `_`, then use letters, digits or `_`."));
    }
    Ok(())
}

fn resume_keys(primary: &dyn SortedStore, keys: &dyn KeyGenerator) -> Result<(), Error> {
    if let Some(last) = primary.last_key()? {
        let last = std::str::from_utf8(&last).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("primary key is not utf-8")
                .with_source(err)
        })?;
        keys.resume_after(last);
    }
    Ok(())
}

fn usage(message: impl Into<String>, table: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(message)
        .with_table(table)
}

struct SecondaryIndex<R> {
    extract: IndexFn<R>,
    store: Box<dyn SortedStore>,
}

pub struct Table<R> {
    name: String,
    columns: Vec<(String, ColumnFn<R>)>,
    indexes: BTreeMap<String, SecondaryIndex<R>>,
    keys: Box<dyn KeyGenerator>,
    codec: Box<dyn RowCodec<R>>,
    primary: Box<dyn SortedStore>,
}

impl<R> std::fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<R> Table<R> {
    /// Opens the primary store and every index store; stores opened before a failure
    /// are closed again before the error is returned.
    pub fn open(def: TableDef<R>, provider: &dyn StoreProvider) -> Result<Self, Error> {
        def.validate()?;
        let TableDef {
            name,
            columns,
            indexes: index_defs,
            keys,
            codec,
        } = def;

        let primary = provider
            .open_store(&name, None)
            .map_err(|err| err.with_table(&name))?;
        if let Err(err) = resume_keys(primary.as_ref(), keys.as_ref()) {
            let _ = primary.close();
            return Err(err.with_table(&name));
        }
        let mut indexes = BTreeMap::new();
        for (index_name, extract) in index_defs {
            match provider.open_store(&name, Some(&index_name)) {
                Ok(store) => {
                    indexes.insert(index_name, SecondaryIndex { extract, store });
                }
                Err(err) => {
                    let _ = primary.close();
                    for index in indexes.values() {
                        let _ = index.store.close();
                    }
                    return Err(err.with_table(&name).with_index(index_name));
                }
            }
        }

        Ok(Self {
            name,
            columns,
            indexes,
            keys,
            codec,
            primary,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names in declared order.
    pub fn desc(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn len(&self) -> Result<usize, Error> {
        self.primary.len()
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        self.primary.is_empty()
    }

    /// Stores `row` under a freshly generated primary key and returns that key.
    pub fn insert(&self, row: &R) -> Result<String, Error> {
        let key = self.keys.next_key();
        let payload = self.codec.encode(row).map_err(|err| err.with_table(&self.name))?;

        let mut staged = Vec::with_capacity(self.indexes.len());
        for (index_name, index) in &self.indexes {
            let value = (index.extract)(row);
            let entry = codec::encode_index_key(&value, &key)
                .map_err(|err| err.with_table(&self.name).with_index(index_name))?;
            staged.push((index_name.as_str(), index, entry));
        }

        if self
            .primary
            .get(key.as_bytes())
            .map_err(|err| err.with_table(&self.name))?
            .is_some()
        {
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!("generated primary key {key} already exists"))
                .with_table(&self.name)
                .with_hint("The key generator must produce keys above every stored key."));
        }
        self.primary
            .put(key.as_bytes(), &payload)
            .map_err(|err| err.with_table(&self.name))?;

        for (written, (index_name, index, entry)) in staged.iter().enumerate() {
            if let Err(err) = index.store.put(entry, key.as_bytes()) {
                let rolled_back = self.roll_back(&key, &staged[..written]);
                warn!(
                    table = %self.name,
                    index = %index_name,
                    key = %key,
                    rolled_back,
                    "index write failed"
                );
                let message = if rolled_back {
                    "index write failed; insert rolled back"
                } else {
                    "index write failed; rollback incomplete"
                };
                return Err(Error::new(ErrorKind::PartialWrite)
                    .with_message(message)
                    .with_table(&self.name)
                    .with_index(*index_name)
                    .with_cause(err));
            }
        }

        debug!(table = %self.name, key = %key, indexes = staged.len(), "row inserted");
        Ok(key)
    }

    fn roll_back(&self, key: &str, written: &[(&str, &SecondaryIndex<R>, Vec<u8>)]) -> bool {
        let mut clean = true;
        for (index_name, index, entry) in written {
            if let Err(err) = index.store.remove(entry) {
                warn!(table = %self.name, index = %index_name, error = %err, "rollback failed");
                clean = false;
            }
        }
        if let Err(err) = self.primary.remove(key.as_bytes()) {
            warn!(table = %self.name, error = %err, "rollback of primary row failed");
            clean = false;
        }
        clean
    }

    /// Full scan in primary-key order, at most `limit` rows.
    pub fn scan(&self, limit: usize, mut on_each: impl FnMut(R)) -> Result<usize, Error> {
        self.scan_while(limit, |_, row| {
            on_each(row);
            Ok(true)
        })
    }

    /// Full scan whose visitor may stop early by returning `Ok(false)`.
    pub fn scan_while(
        &self,
        limit: usize,
        mut on_each: impl FnMut(&str, R) -> Result<bool, Error>,
    ) -> Result<usize, Error> {
        self.primary
            .iterate_prefix(b"", limit, &mut |key, value| {
                let key = std::str::from_utf8(key).map_err(|err| {
                    Error::new(ErrorKind::Corrupt)
                        .with_message("primary key is not utf-8")
                        .with_source(err)
                })?;
                let row = self.codec.decode(value)?;
                on_each(key, row)
            })
            .map_err(|err| err.with_table(&self.name))
    }

    /// Delivers rows whose index value starts with `value`, at most `limit` rows.
    pub fn match_index(
        &self,
        index: &str,
        value: &str,
        limit: usize,
        on_each: impl FnMut(R),
    ) -> Result<usize, Error> {
        self.lookup(index, value.as_bytes(), limit, on_each)
    }

    /// Collecting form of [`Table::match_index`].
    pub fn match_into(
        &self,
        index: &str,
        value: &str,
        limit: usize,
        out: &mut Vec<R>,
    ) -> Result<usize, Error> {
        self.match_index(index, value, limit, |row| out.push(row))
    }

    /// Delivers rows whose index value equals `value` exactly.
    pub fn match_exact(
        &self,
        index: &str,
        value: &str,
        limit: usize,
        on_each: impl FnMut(R),
    ) -> Result<usize, Error> {
        self.lookup(index, &codec::exact_prefix(value), limit, on_each)
    }

    fn lookup(
        &self,
        index: &str,
        prefix: &[u8],
        limit: usize,
        mut on_each: impl FnMut(R),
    ) -> Result<usize, Error> {
        let secondary = self.indexes.get(index).ok_or_else(|| {
            Error::new(ErrorKind::UnknownIndex)
                .with_message(format!("no index named `{index}`"))
                .with_table(&self.name)
                .with_index(index)
        })?;

        secondary
            .store
            .iterate_prefix(prefix, limit, &mut |entry, _| {
                let key = codec::decode_primary_key(entry)?;
                let payload = self.primary.get(key.as_bytes())?.ok_or_else(|| {
                    Error::new(ErrorKind::Corrupt)
                        .with_message(format!("index entry points at missing row {key}"))
                })?;
                on_each(self.codec.decode(&payload)?);
                Ok(true)
            })
            .map_err(|err| err.with_table(&self.name).with_index(index))
    }

    /// Projects `row` through the column extractors.
    pub fn project(&self, key: &str, row: &R) -> RowView {
        let columns = self
            .columns
            .iter()
            .map(|(name, extract)| (name.clone(), extract(row)))
            .collect();
        RowView::new(key, columns)
    }

    /// Closes every store, reporting the first failure after attempting all of them.
    pub fn close(&self) -> Result<(), Error> {
        let mut first_err = self.primary.close().err();
        for index in self.indexes.values() {
            if let Err(err) = index.store.close() {
                first_err.get_or_insert(err);
            }
        }
        debug!(table = %self.name, "table closed");
        match first_err {
            Some(err) => Err(err.with_table(&self.name)),
            None => Ok(()),
        }
    }
}

/// Row-type-erased view of a table used by the query engine and the registry.
pub trait QueryTarget: Send + Sync {
    fn name(&self) -> &str;

    fn columns(&self) -> Vec<String>;

    fn scan_rows(
        &self,
        limit: usize,
        on_each: &mut dyn FnMut(RowView) -> Result<bool, Error>,
    ) -> Result<usize, Error>;

    fn close(&self) -> Result<(), Error>;
}

impl<R> QueryTarget for Table<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<String> {
        self.desc()
    }

    fn scan_rows(
        &self,
        limit: usize,
        on_each: &mut dyn FnMut(RowView) -> Result<bool, Error>,
    ) -> Result<usize, Error> {
        self.scan_while(limit, |key, row| on_each(self.project(key, &row)))
    }

    fn close(&self) -> Result<(), Error> {
        Table::close(self)
    }
}
