//! Purpose: Define the sorted byte-keyed storage contract and the in-memory backend.
//! Exports: `SortedStore`, `StoreProvider`, `Visitor`, `Entry`, `MemoryStore`, `MemoryProvider`.
//! Role: Single scan primitive shared by tables, indexes, and the time-ordered store.
//! Invariants: Keys are ordered by raw bytes; scans deliver keys in ascending order.
//! Invariants: Scans copy bounded batches out of the backend, so no backend lock is held
//! while a visitor runs (visitors may read or write the same store).
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::error::{Error, ErrorKind};

/// Entries copied out of a backend per batch.
pub const SCAN_BATCH: usize = 128;

pub type Entry = (Vec<u8>, Vec<u8>);

/// Scan visitor: return `Ok(true)` to keep going, `Ok(false)` to stop early.
pub type Visitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<bool, Error> + 'a;

pub trait SortedStore: Send + Sync {
    /// Overwrites any existing value for `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &[u8]) -> Result<(), Error>;

    /// Returns up to `max` entries in key order starting at `lower`.
    fn read_batch(&self, lower: Bound<&[u8]>, max: usize) -> Result<Vec<Entry>, Error>;

    fn len(&self) -> Result<usize, Error>;

    /// Greatest key in the store. The default walks every key; backends with an
    /// ordered index override it.
    fn last_key(&self) -> Result<Option<Vec<u8>>, Error> {
        let mut last = None;
        self.iterate_range(b"", None, usize::MAX, &mut |key, _| {
            last = Some(key.to_vec());
            Ok(true)
        })?;
        Ok(last)
    }

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Releases backend resources. Later calls fail with `ErrorKind::Closed`.
    fn close(&self) -> Result<(), Error>;

    /// Visits keys starting at the first key `>= prefix` while they still start with
    /// `prefix`, delivering at most `limit` entries. Returns the delivered count.
    fn iterate_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
        on_each: &mut Visitor<'_>,
    ) -> Result<usize, Error> {
        drive_scan(self, prefix, Stop::Prefix(prefix), limit, on_each)
    }

    /// Visits keys in `[from, to_inclusive]`; an empty `from` starts at the first key
    /// and `None` leaves the upper end open.
    fn iterate_range(
        &self,
        from: &[u8],
        to_inclusive: Option<&[u8]>,
        limit: usize,
        on_each: &mut Visitor<'_>,
    ) -> Result<usize, Error> {
        let stop = match to_inclusive {
            Some(to) => Stop::Through(to),
            None => Stop::Open,
        };
        drive_scan(self, from, stop, limit, on_each)
    }
}

/// Opens the stores backing one table: the primary store when `index` is `None`,
/// otherwise the named secondary index store.
pub trait StoreProvider: Send + Sync {
    fn open_store(&self, table: &str, index: Option<&str>) -> Result<Box<dyn SortedStore>, Error>;
}

#[derive(Clone, Copy, Debug)]
enum Stop<'a> {
    Prefix(&'a [u8]),
    Through(&'a [u8]),
    Open,
}

impl Stop<'_> {
    fn admits(&self, key: &[u8]) -> bool {
        match self {
            Stop::Prefix(prefix) => key.starts_with(prefix),
            Stop::Through(upper) => key <= *upper,
            Stop::Open => true,
        }
    }
}

fn drive_scan<S: SortedStore + ?Sized>(
    store: &S,
    from: &[u8],
    stop: Stop<'_>,
    limit: usize,
    on_each: &mut Visitor<'_>,
) -> Result<usize, Error> {
    let mut delivered = 0usize;
    let mut cursor = from.to_vec();
    let mut first = true;

    while delivered < limit {
        let want = (limit - delivered).min(SCAN_BATCH);
        let lower = if first {
            Bound::Included(cursor.as_slice())
        } else {
            Bound::Excluded(cursor.as_slice())
        };
        let batch = store.read_batch(lower, want)?;
        let exhausted = batch.len() < want;

        for (key, value) in batch {
            if !stop.admits(&key) {
                return Ok(delivered);
            }
            delivered += 1;
            if !on_each(&key, &value)? {
                return Ok(delivered);
            }
            cursor = key;
        }
        first = false;

        if exhausted {
            break;
        }
    }

    Ok(delivered)
}

pub(crate) fn collect_batch(
    entries: &BTreeMap<Vec<u8>, Vec<u8>>,
    lower: Bound<&[u8]>,
    max: usize,
) -> Vec<Entry> {
    entries
        .range::<[u8], _>((lower, Bound::Unbounded))
        .take(max)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub(crate) fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::new(ErrorKind::Internal).with_message("store lock poisoned")
}

pub(crate) fn closed_error() -> Error {
    Error::new(ErrorKind::Closed).with_message("store is closed")
}

/// Process-memory backend over a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        self.entries.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        self.entries.write().map_err(poisoned)
    }
}

impl SortedStore for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.write()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.read()?.get(key).cloned())
    }

    fn remove(&self, key: &[u8]) -> Result<(), Error> {
        self.write()?.remove(key);
        Ok(())
    }

    fn read_batch(&self, lower: Bound<&[u8]>, max: usize) -> Result<Vec<Entry>, Error> {
        let entries = self.read()?;
        Ok(collect_batch(&entries, lower, max))
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.read()?.len())
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.read()?.keys().next_back().cloned())
    }

    fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryProvider;

impl StoreProvider for MemoryProvider {
    fn open_store(&self, _table: &str, _index: Option<&str>) -> Result<Box<dyn SortedStore>, Error> {
        Ok(Box::new(MemoryStore::new()))
    }
}
