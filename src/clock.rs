//! Time sources for the engine.

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Supplies the current time to the engine. Swapped for a manual clock in tests.
pub trait Clock: Send + 'static {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date used as the key for daily statistics.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;
