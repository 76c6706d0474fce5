// Append-only file backend: replay on open, ordered in-memory index, exclusive file lock.
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bstr::ByteSlice;
use fs2::FileExt;
use libc::{EACCES, EPERM};
use memmap2::Mmap;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{self, ReadRecord, RecordKind};
use crate::core::store::{
    closed_error, collect_batch, poisoned, Entry, SortedStore, StoreProvider,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Durability {
    /// Appends go to the OS page cache.
    #[default]
    Fast,
    /// Every record is followed by `sync_data`.
    Flush,
}

struct LogState {
    file: Option<File>,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

pub struct LogStore {
    path: PathBuf,
    durability: Durability,
    state: RwLock<LogState>,
}

impl LogStore {
    pub fn open(path: impl AsRef<Path>, durability: Durability) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        file.try_lock_exclusive().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_message("store is locked by another process")
                .with_path(&path)
                .with_source(err)
        })?;

        let entries = match replay(&file, &path) {
            Ok(entries) => entries,
            Err(err) => {
                let _ = file.unlock();
                return Err(err);
            }
        };
        debug!(path = %path.display(), keys = entries.len(), "log store opened");

        Ok(Self {
            path,
            durability,
            state: RwLock::new(LogState {
                file: Some(file),
                entries,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LogState>, Error> {
        let state = self.state.read().map_err(poisoned)?;
        if state.file.is_none() {
            return Err(closed_error().with_path(&self.path));
        }
        Ok(state)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LogState>, Error> {
        let state = self.state.write().map_err(poisoned)?;
        if state.file.is_none() {
            return Err(closed_error().with_path(&self.path));
        }
        Ok(state)
    }

    fn append(&self, state: &mut LogState, kind: RecordKind, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let record = frame::encode_record(kind, key, value)?;
        let file = state.file.as_mut().ok_or_else(closed_error)?;
        let durability = self.durability;
        append_or_rewind(file, |file| {
            file.write_all(&record)?;
            if durability == Durability::Flush {
                file.sync_data()?;
            }
            Ok(())
        })
        .map_err(|err| self.io_error(err, key))
    }

    fn io_error(&self, err: io::Error, key: &[u8]) -> Error {
        Error::new(ErrorKind::Io)
            .with_message(format!("append failed for key {}", key.as_bstr()))
            .with_path(&self.path)
            .with_source(err)
    }
}

impl SortedStore for LogStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let mut state = self.write()?;
        self.append(&mut state, RecordKind::Put, key, value)?;
        state.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.read()?.entries.get(key).cloned())
    }

    fn remove(&self, key: &[u8]) -> Result<(), Error> {
        let mut state = self.write()?;
        if !state.entries.contains_key(key) {
            return Ok(());
        }
        self.append(&mut state, RecordKind::Remove, key, &[])?;
        state.entries.remove(key);
        Ok(())
    }

    fn read_batch(&self, lower: Bound<&[u8]>, max: usize) -> Result<Vec<Entry>, Error> {
        let state = self.read()?;
        Ok(collect_batch(&state.entries, lower, max))
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.read()?.entries.len())
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.read()?.entries.keys().next_back().cloned())
    }

    fn close(&self) -> Result<(), Error> {
        let mut state = self.state.write().map_err(poisoned)?;
        let Some(file) = state.file.take() else {
            return Ok(());
        };
        state.entries.clear();
        let synced = file.sync_all();
        let _ = file.unlock();
        debug!(path = %self.path.display(), "log store closed");
        synced.map_err(|err| Error::new(ErrorKind::Io).with_path(&self.path).with_source(err))
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Runs `write` against the end of `file`; on failure the file is cut back to its
/// previous length so a half-written record never sits in front of later appends.
fn append_or_rewind(
    file: &mut File,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> io::Result<()> {
    let start = file.metadata()?.len();
    if let Err(err) = write(file) {
        if let Err(rewind) = file.set_len(start) {
            warn!(error = %rewind, "failed to cut back partial append");
        }
        return Err(err);
    }
    Ok(())
}

fn replay(file: &File, path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, Error> {
    let mut entries = BTreeMap::new();
    let len = file
        .metadata()
        .map(|meta| meta.len())
        .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?;
    if len == 0 {
        return Ok(entries);
    }

    let mmap = unsafe {
        Mmap::map(file).map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?
    };

    let mut offset = 0usize;
    let mut records = 0usize;
    while offset < mmap.len() {
        match frame::read_record_at(&mmap, offset).map_err(|err| err.with_path(path))? {
            ReadRecord::Record {
                kind,
                key,
                value,
                next_off,
            } => {
                match kind {
                    RecordKind::Put => {
                        entries.insert(key.to_vec(), value.to_vec());
                    }
                    RecordKind::Remove => {
                        entries.remove(key);
                    }
                }
                records += 1;
                offset = next_off;
            }
            ReadRecord::Torn => break,
        }
    }
    let total = mmap.len();
    drop(mmap);

    if offset < total {
        warn!(
            path = %path.display(),
            offset,
            dropped = total - offset,
            "truncating torn log tail"
        );
        file.set_len(offset as u64)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?;
    }
    debug!(path = %path.display(), records, "log replayed");
    Ok(entries)
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Usage;
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Usage,
        _ => ErrorKind::Io,
    }
}

/// One log file per store under `dir`: `<table>.tbl` and `<table>.<index>.idx`.
#[derive(Clone, Debug)]
pub struct LogProvider {
    dir: PathBuf,
    durability: Durability,
}

impl LogProvider {
    pub fn new(dir: impl Into<PathBuf>, durability: Durability) -> Self {
        Self {
            dir: dir.into(),
            durability,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store_path(&self, table: &str, index: Option<&str>) -> PathBuf {
        match index {
            Some(index) => self.dir.join(format!("{table}.{index}.idx")),
            None => self.dir.join(format!("{table}.tbl")),
        }
    }
}

impl StoreProvider for LogProvider {
    fn open_store(&self, table: &str, index: Option<&str>) -> Result<Box<dyn SortedStore>, Error> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create store directory")
                .with_path(&self.dir)
                .with_source(err)
        })?;
        let store = LogStore::open(self.store_path(table, index), self.durability)?;
        Ok(Box::new(store))
    }
}
