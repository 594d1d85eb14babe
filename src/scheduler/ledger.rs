use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Timelike};

use super::ScheduleEntry;

/// A civil minute on a specific day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FireStamp {
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
}

impl FireStamp {
    pub fn of<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            date: now.date_naive(),
            hour: now.hour(),
            minute: now.minute(),
        }
    }

    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        self.hour == entry.hour && self.minute == entry.minute
    }
}

/// Last civil minute each entry fired in. Never cleared: a later day's
/// identical wall-clock time is a different stamp.
#[derive(Debug, Default)]
pub struct FireLedger {
    last: HashMap<ScheduleEntry, FireStamp>,
}

impl FireLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Due now and not already fired in this civil minute.
    pub fn should_fire(&self, entry: &ScheduleEntry, now: &FireStamp) -> bool {
        now.matches(entry) && self.last.get(entry) != Some(now)
    }

    pub fn record(&mut self, entry: ScheduleEntry, stamp: FireStamp) {
        self.last.insert(entry, stamp);
    }

    pub fn last_fired(&self, entry: &ScheduleEntry) -> Option<FireStamp> {
        self.last.get(entry).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(day: u32, hour: u32, minute: u32) -> FireStamp {
        FireStamp {
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            hour,
            minute,
        }
    }

    #[test]
    fn test_fires_once_per_civil_minute() {
        let entry = ScheduleEntry { hour: 8, minute: 0 };
        let mut ledger = FireLedger::new();

        assert!(ledger.should_fire(&entry, &stamp(2, 8, 0)));
        ledger.record(entry, stamp(2, 8, 0));
        assert!(!ledger.should_fire(&entry, &stamp(2, 8, 0)));
        assert!(!ledger.should_fire(&entry, &stamp(2, 8, 1)));
        assert!(ledger.should_fire(&entry, &stamp(3, 8, 0)));
    }

    #[test]
    fn test_entries_are_independent() {
        let morning = ScheduleEntry { hour: 8, minute: 0 };
        let midnight = ScheduleEntry { hour: 0, minute: 0 };
        let mut ledger = FireLedger::new();
        ledger.record(morning, stamp(2, 8, 0));

        assert!(ledger.should_fire(&midnight, &stamp(3, 0, 0)));
        assert_eq!(ledger.last_fired(&midnight), None);
        assert_eq!(ledger.last_fired(&morning), Some(stamp(2, 8, 0)));
    }
}
