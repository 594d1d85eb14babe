//! Recurring civil-time triggers.
//!
//! Each entry is a wall-clock `HH:MM` in one configured timezone and fires at
//! most once per matching civil minute. Everything runs on one logical thread:
//! while an invocation is in flight nothing else is polled.

pub mod clock;
pub mod engine;
pub mod ledger;
pub mod preview;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-support"))]
pub use clock::ManualClock;
pub use engine::{next_poll_delay, TriggerScheduler};
pub use ledger::{FireLedger, FireStamp};
pub use preview::upcoming;

/// A daily trigger point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScheduleEntry {
    pub hour: u32,
    pub minute: u32,
}

impl ScheduleEntry {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleParseError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleParseError::OutOfRange { hour, minute });
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleParseError {
    #[error("invalid schedule time '{0}', expected HH:MM")]
    Format(String),
    #[error("schedule time {hour}:{minute:02} out of range")]
    OutOfRange { hour: u32, minute: u32 },
}

impl FromStr for ScheduleEntry {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ScheduleParseError::Format(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        let digits = |p: &str| !p.is_empty() && p.len() <= 2 && p.chars().all(|c| c.is_ascii_digit());
        if !digits(h) || !digits(m) {
            return Err(bad());
        }
        let hour = h.parse().map_err(|_| bad())?;
        let minute = m.parse().map_err(|_| bad())?;
        Self::new(hour, minute)
    }
}
