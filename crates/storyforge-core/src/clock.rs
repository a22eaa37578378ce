//! Clock abstraction for determinism.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the instant before which an in-flight record counts as stale.
    ///
    /// A zero `threshold` means "force-expire": every in-flight record is
    /// stale, signalled by `None`. The cutoff never falls before the Unix
    /// epoch, which keeps it inside the range `timestamptz` can store.
    fn stale_cutoff(&self, threshold: Duration) -> Option<DateTime<Utc>> {
        if threshold.is_zero() {
            return None;
        }
        let cutoff = TimeDelta::from_std(threshold)
            .ok()
            .and_then(|delta| self.now().checked_sub_signed(delta))
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |cutoff| cutoff.max(DateTime::<Utc>::UNIX_EPOCH));
        Some(cutoff)
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
