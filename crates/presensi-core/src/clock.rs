//! Injectable clock — the single authoritative source of "now".
//!
//! Core logic never reads the system clock directly; it goes through this
//! trait so tests can pin or advance time around the cutoff boundaries.

use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, Utc};

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// "Now" shifted into the given local offset. All date and cutoff
    /// comparisons use this, never the raw UTC instant.
    fn now_local(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        self.now_utc().with_timezone(&offset)
    }
}

/// Production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to a settable instant.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 30, 0).unwrap();
        let clock = FixedClock::at(start);
        assert_eq!(clock.now_utc(), start);

        clock.advance(chrono::Duration::hours(9));
        assert_eq!(clock.now_utc(), start + chrono::Duration::hours(9));
    }

    #[test]
    fn test_now_local_crosses_date_line() {
        // 23:00 UTC is already the next day at UTC+7.
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap());
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let local = clock.now_local(offset);
        assert_eq!(local.date_naive().to_string(), "2026-03-03");
    }
}
