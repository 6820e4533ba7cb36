use std::sync::RwLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

/// Source of "now". Injected so the day boundary is under test control.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().expect("clock poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock poisoned")
    }
}

/// Half-open `[start, end)` span covering one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Decides where midnight falls. Fixed offset, so every day is exactly 24h.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPolicy {
    offset: FixedOffset,
}

impl DayPolicy {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Offset of the server's local time zone right now.
    pub fn local() -> Self {
        Self::new(*chrono::Local::now().offset())
    }

    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn day_of(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.offset).date_naive()
    }

    pub fn window_for(&self, day: NaiveDate) -> DayWindow {
        let local_midnight = day.and_time(chrono::NaiveTime::MIN);
        // a fixed offset has no gaps, so local midnight always maps to exactly one instant
        let start = (local_midnight - self.offset).and_utc();
        DayWindow {
            day,
            start,
            end: start + Duration::hours(24),
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> DayWindow {
        self.window_for(self.day_of(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_window_spans_midnight_to_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 30, 0).unwrap();
        let w = DayPolicy::utc().window(now);

        assert_eq!(w.day, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap());
        assert!(w.contains(w.start));
        assert!(!w.contains(w.end));
    }

    #[test]
    fn offset_moves_the_boundary() {
        // 20:00 UTC is already the next day at UTC+06:00
        let policy = DayPolicy::from_offset_minutes(360).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 20, 0, 0).unwrap();
        let w = policy.window(now);

        assert_eq!(w.day, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 3, 10, 18, 0, 0).unwrap());
        assert!(w.contains(now));
    }

    #[test]
    fn negative_offsets_work() {
        let policy = DayPolicy::from_offset_minutes(-300).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 0).unwrap();
        let w = policy.window(now);

        assert_eq!(w.day, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 3, 9, 5, 0, 0).unwrap());
    }

    #[test]
    fn absurd_offsets_are_rejected() {
        assert!(DayPolicy::from_offset_minutes(24 * 60).is_none());
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));
    }
}
