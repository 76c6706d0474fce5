//! Purpose: Time-ordered event store keyed by `yyyyMMddHHmmss.<counter>`.
//! Exports: `TimeSeries`, `EventTime`.
//! Role: Maps time queries onto prefix/range scans of a single sorted store.
//! Invariants: Keys sort by second, then by arrival within the same second.
//! Invariants: Row-to-event builders live in a per-instance registry keyed by `TypeId`.
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};
use tracing::debug;

use crate::core::codec::{JsonCodec, RowCodec};
use crate::core::error::{Error, ErrorKind};
use crate::core::store::SortedStore;

const COUNTER_MAX: &str = "9999999999";

pub trait EventTime {
    fn event_time(&self) -> PrimitiveDateTime;
}

type Builder<E> = Box<dyn Fn(&dyn Any) -> Option<E> + Send + Sync>;

pub struct TimeSeries<E> {
    store: Box<dyn SortedStore>,
    codec: Box<dyn RowCodec<E>>,
    builders: HashMap<TypeId, Builder<E>>,
    counter: AtomicU64,
}

impl<E: EventTime + Serialize + DeserializeOwned + 'static> TimeSeries<E> {
    pub fn new(store: Box<dyn SortedStore>) -> Result<Self, Error> {
        Self::with_codec(store, JsonCodec::<E>::new())
    }
}

impl<E: EventTime + 'static> TimeSeries<E> {
    /// The tie-break counter resumes after the events already in `store`.
    pub fn with_codec(
        store: Box<dyn SortedStore>,
        codec: impl RowCodec<E> + 'static,
    ) -> Result<Self, Error> {
        let existing = store.len()? as u64;
        Ok(Self {
            store,
            codec: Box::new(codec),
            builders: HashMap::new(),
            counter: AtomicU64::new(existing),
        })
    }

    /// Registers how rows of type `T` become events; replaces any earlier builder for `T`.
    pub fn register<T: 'static>(&mut self, build: impl Fn(&T) -> E + Send + Sync + 'static) {
        let builder: Builder<E> = Box::new(move |row: &dyn Any| row.downcast_ref::<T>().map(&build));
        self.builders.insert(TypeId::of::<T>(), builder);
    }

    /// Converts `row` with its registered builder and appends the event; returns its key.
    pub fn insert<T: 'static>(&self, row: &T) -> Result<String, Error> {
        let builder = self.builders.get(&TypeId::of::<T>()).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "no event builder registered for {}",
                    std::any::type_name::<T>()
                ))
                .with_hint("Call TimeSeries::register for this row type first.")
        })?;
        let event = builder(row as &dyn Any).ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("event builder type mismatch")
        })?;
        self.append(&event)
    }

    /// Appends an already-built event.
    pub fn append(&self, event: &E) -> Result<String, Error> {
        let seq = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        let key = format!("{}.{seq:010}", time_key(event.event_time())?);
        let payload = self.codec.encode(event)?;
        self.store.put(key.as_bytes(), &payload)?;
        debug!(key = %key, "event appended");
        Ok(key)
    }

    /// Events in seconds strictly after `time`.
    pub fn greater_than(
        &self,
        time: PrimitiveDateTime,
        on_each: impl FnMut(E) -> bool,
    ) -> Result<usize, Error> {
        let Some(next) = time.checked_add(Duration::SECOND) else {
            return Ok(0);
        };
        let from = time_key(next)?;
        self.scan(from.as_bytes(), None, on_each)
    }

    /// Events in seconds strictly before `time`.
    pub fn less_than(
        &self,
        time: PrimitiveDateTime,
        on_each: impl FnMut(E) -> bool,
    ) -> Result<usize, Error> {
        let to = time_key(time)?;
        self.scan(b"", Some(to.as_bytes()), on_each)
    }

    /// Events from second `start` through second `end`, both inclusive.
    pub fn between(
        &self,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
        on_each: impl FnMut(E) -> bool,
    ) -> Result<usize, Error> {
        let from = time_key(start)?;
        let to = format!("{}.{COUNTER_MAX}", time_key(end)?);
        self.scan(from.as_bytes(), Some(to.as_bytes()), on_each)
    }

    /// Events stamped within second `time`, e.g. all events of `20200901120000`.
    pub fn at(&self, time: PrimitiveDateTime, on_each: impl FnMut(E) -> bool) -> Result<usize, Error> {
        let prefix = format!("{}.", time_key(time)?);
        let mut on_each = on_each;
        self.store.iterate_prefix(prefix.as_bytes(), usize::MAX, &mut |_, value| {
            Ok(on_each(self.codec.decode(value)?))
        })
    }

    pub fn len(&self) -> Result<usize, Error> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        self.store.is_empty()
    }

    pub fn close(&self) -> Result<(), Error> {
        self.store.close()
    }

    fn scan(
        &self,
        from: &[u8],
        to: Option<&[u8]>,
        mut on_each: impl FnMut(E) -> bool,
    ) -> Result<usize, Error> {
        self.store.iterate_range(from, to, usize::MAX, &mut |_, value| {
            Ok(on_each(self.codec.decode(value)?))
        })
    }
}

/// Formats `time` as `yyyyMMddHHmmss`.
pub fn time_key(time: PrimitiveDateTime) -> Result<String, Error> {
    if !(0..=9999).contains(&time.year()) {
        return Err(Error::new(ErrorKind::Usage).with_message("event year must be within 0..=9999"));
    }
    time.format(format_description!("[year][month][day][hour][minute][second]"))
        .map_err(|err| Error::new(ErrorKind::Internal).with_source(err))
}
