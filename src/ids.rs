//! Record identifiers: wall-clock milliseconds with a monotonic floor.
//!
//! An id is the creation time in milliseconds since the epoch. Within one
//! process, ids are strictly increasing: a second id requested in the same
//! millisecond is bumped to `last + 1`. The engine seeds the floor from the
//! largest stored id, so a restart never reuses one. Separate processes
//! writing the same file in the same millisecond can still collide; the
//! primary key rejects the second insert.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct IdGenerator {
    clock: Clock,
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::with_clock(now_millis)
    }

    pub fn with_clock(clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Never hand out an id at or below `floor`. Used to resume after the
    /// largest id already stored.
    pub fn starting_after(self, floor: i64) -> Self {
        self.last.fetch_max(floor, Ordering::AcqRel);
        self
    }

    /// Next identifier: `max(now, last + 1)`.
    pub fn next_id(&self) -> i64 {
        let now = (self.clock)();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = if now > last { now } else { last + 1 };
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("last", &self.last.load(Ordering::Relaxed))
            .finish()
    }
}
