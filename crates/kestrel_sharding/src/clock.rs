//! Source of "now" for `CURRENT_TIMESTAMP`-like predicate operands.

use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;

/// Supplies the current wall-clock time. Injected into the extractor so a
/// statement sees one consistent instant and tests can pin it.
pub trait TimeService: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// UTC system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedTimeService {
    instant: Mutex<NaiveDateTime>,
}

impl FixedTimeService {
    pub fn new(instant: NaiveDateTime) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    pub fn set(&self, instant: NaiveDateTime) {
        *self.instant.lock() = instant;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.instant.lock();
        *guard += by;
    }
}

impl TimeService for FixedTimeService {
    fn now(&self) -> NaiveDateTime {
        *self.instant.lock()
    }
}
