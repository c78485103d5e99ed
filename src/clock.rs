//! Wall-clock access for the circulation engine. Due dates are evaluated
//! lazily against "now", so the source of time is injected rather than read
//! from the system inside every query.

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};

pub trait Clock {
    /// Current local time. Sub-second precision is dropped so stored
    /// timestamps compare cleanly as text.
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Reads the local system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Always reports the same instant. Used by tests and batch tooling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Midday on the given date.
    pub fn on(date: NaiveDate) -> Self {
        FixedClock(date.and_hms_opt(12, 0, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
