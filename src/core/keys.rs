// Primary-key generators: fixed-width decimal strings that sort in generation order.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait KeyGenerator: Send + Sync {
    fn next_key(&self) -> String;

    /// Called when a table opens over existing rows; later keys must sort after
    /// `last_key`. Keys this generator could not have produced are ignored.
    fn resume_after(&self, _last_key: &str) {}
}

/// Nanosecond wall-clock keys, bumped past the previous key when the clock stalls
/// or steps backwards.
#[derive(Debug, Default)]
pub struct NanoClock {
    last: AtomicU64,
}

impl NanoClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyGenerator for NanoClock {
    fn next_key(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        let mut previous = self.last.load(Ordering::Acquire);
        loop {
            let next = now.max(previous + 1);
            match self
                .last
                .compare_exchange_weak(previous, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return format_key(next),
                Err(actual) => previous = actual,
            }
        }
    }

    fn resume_after(&self, last_key: &str) {
        if let Some(last) = parse_key(last_key) {
            self.last.fetch_max(last, Ordering::AcqRel);
        }
    }
}

/// Counter keys starting at `start + 1`.
#[derive(Debug, Default)]
pub struct Sequence {
    next: AtomicU64,
}

impl Sequence {
    pub fn starting_after(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl KeyGenerator for Sequence {
    fn next_key(&self) -> String {
        format_key(self.next.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn resume_after(&self, last_key: &str) {
        if let Some(last) = parse_key(last_key) {
            self.next.fetch_max(last, Ordering::AcqRel);
        }
    }
}

fn format_key(value: u64) -> String {
    format!("{value:020}")
}

fn parse_key(key: &str) -> Option<u64> {
    if key.len() != 20 || !key.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}
