use std::time::Instant;

use chrono::{NaiveTime, Timelike};

/// Time source for every timer in the core.
///
/// Timers are stored as `Instant` deadlines and fired by `AppCore::tick`, so a
/// manual clock drives the whole core deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    /// Wall-clock time of day in the user's local zone (Do-Not-Disturb schedules).
    fn local_time(&self) -> NaiveTime;
    fn unix_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_time(&self) -> NaiveTime {
        chrono::Local::now().time()
    }

    fn unix_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Minutes since local midnight.
pub fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}
