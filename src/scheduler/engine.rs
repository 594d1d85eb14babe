use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Clock, FireLedger, FireStamp, ScheduleEntry};
use crate::outcome::RunOutcome;
use crate::retry::panic_message;

/// How far past a minute boundary a poll lands.
const BOUNDARY_MARGIN: Duration = Duration::from_millis(500);

/// Polls the clock and fires due entries in configuration order.
pub struct TriggerScheduler<C> {
    entries: Vec<ScheduleEntry>,
    ledger: FireLedger,
    clock: C,
    poll_interval: Duration,
}

impl<C: Clock> TriggerScheduler<C> {
    pub fn new(entries: Vec<ScheduleEntry>, clock: C) -> Self {
        let mut unique = Vec::with_capacity(entries.len());
        for entry in entries {
            if !unique.contains(&entry) {
                unique.push(entry);
            }
        }
        Self {
            entries: unique,
            ledger: FireLedger::new(),
            clock,
            poll_interval: Duration::from_secs(60),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn ledger(&self) -> &FireLedger {
        &self.ledger
    }

    /// One evaluation pass. Returns how many entries were invoked.
    ///
    /// The clock is read again before each entry, so an entry that comes due
    /// while an earlier one is running is still served in this pass. The
    /// ledger is stamped after every invocation whatever its result, and an
    /// error or panic in one entry never stops the remaining ones. Entries
    /// left once `cancel` fires are neither invoked nor stamped.
    pub async fn poll<F, Fut>(&mut self, invoke: &mut F, cancel: &CancellationToken) -> usize
    where
        F: FnMut(ScheduleEntry) -> Fut,
        Fut: Future<Output = anyhow::Result<RunOutcome>>,
    {
        let mut fired = 0;

        for entry in &self.entries {
            if cancel.is_cancelled() {
                debug!("Cancelled, skipping remaining entries");
                break;
            }
            let now = self.clock.now();
            let stamp = FireStamp::of(&now);
            if !self.ledger.should_fire(entry, &stamp) {
                continue;
            }
            info!(entry = %entry, at = %now.format("%Y-%m-%d %H:%M %Z"), "Schedule entry due");

            let result = AssertUnwindSafe(invoke(*entry)).catch_unwind().await;
            self.ledger.record(*entry, stamp);
            fired += 1;

            match result {
                Ok(Ok(outcome)) => info!(entry = %entry, %outcome, "Scheduled run finished"),
                Ok(Err(e)) => error!(entry = %entry, error = %e, "Scheduled run failed"),
                Err(panic) => {
                    error!(entry = %entry, panic = %panic_message(&*panic), "Scheduled run panicked")
                }
            }
        }
        fired
    }

    /// Poll until `cancel` fires. Cancellation is observed between polls;
    /// an invocation in flight is left to finish.
    pub async fn run<F, Fut>(&mut self, mut invoke: F, cancel: &CancellationToken)
    where
        F: FnMut(ScheduleEntry) -> Fut,
        Fut: Future<Output = anyhow::Result<RunOutcome>>,
    {
        let times: Vec<String> = self.entries.iter().map(ToString::to_string).collect();
        info!(entries = ?times, tz = %self.clock.now().timezone(), "Scheduler started");
        if self.entries.is_empty() {
            warn!("No schedule entries configured, nothing will fire");
        }

        while !cancel.is_cancelled() {
            self.poll(&mut invoke, cancel).await;

            let wait = next_poll_delay(&self.clock.now(), self.poll_interval);
            debug!(wait_ms = wait.as_millis() as u64, "Sleeping until next poll");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        info!("Scheduler stopped");
    }
}

/// Time until just past the next civil minute boundary, never more than
/// `poll_interval`.
pub fn next_poll_delay<Tz: TimeZone>(now: &DateTime<Tz>, poll_interval: Duration) -> Duration {
    let into_minute =
        u64::from(now.second()) * 1000 + u64::from(now.timestamp_subsec_millis().min(999));
    let to_boundary = Duration::from_millis(60_000 - into_minute.min(59_999));
    (to_boundary + BOUNDARY_MARGIN).min(poll_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use chrono_tz::Europe::Rome;

    fn at(h: u32, m: u32, s: u32) -> DateTime<chrono_tz::Tz> {
        Rome.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    #[test]
    fn test_delay_aligns_to_minute_boundary() {
        let interval = Duration::from_secs(60);
        assert_eq!(next_poll_delay(&at(8, 0, 45), interval), Duration::from_millis(15_500));
        assert_eq!(next_poll_delay(&at(8, 0, 0), interval), Duration::from_secs(60));
        assert_eq!(
            next_poll_delay(&at(8, 0, 10), Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_duplicate_entries_collapse() {
        let e = ScheduleEntry { hour: 8, minute: 0 };
        let s = TriggerScheduler::new(vec![e, e], ManualClock::new(at(7, 0, 0)));
        assert_eq!(s.entries(), &[e]);
    }

    #[tokio::test]
    async fn test_ledger_stamped_even_when_invocation_fails() {
        let entry = ScheduleEntry { hour: 8, minute: 0 };
        let clock = ManualClock::new(at(8, 0, 5));
        let mut s = TriggerScheduler::new(vec![entry], clock.clone());

        let mut invoke =
            |_: ScheduleEntry| async { Err::<RunOutcome, _>(anyhow::anyhow!("webdriver down")) };
        let cancel = CancellationToken::new();
        assert_eq!(s.poll(&mut invoke, &cancel).await, 1);
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(s.poll(&mut invoke, &cancel).await, 0);
        assert!(s.ledger().last_fired(&entry).is_some());
    }

    #[tokio::test]
    async fn test_cancel_during_entry_skips_the_rest() {
        let first = ScheduleEntry { hour: 8, minute: 0 };
        let second = ScheduleEntry { hour: 8, minute: 1 };
        let clock = ManualClock::new(at(8, 0, 50));
        let mut s = TriggerScheduler::new(vec![first, second], clock.clone());
        let cancel = CancellationToken::new();

        let mut calls = Vec::new();
        let trigger = cancel.clone();
        let mut invoke = |e: ScheduleEntry| {
            calls.push(e);
            // Interrupted while the 08:00 run is in flight, as 08:01 comes due.
            clock.advance(chrono::Duration::seconds(20));
            trigger.cancel();
            async { Ok(RunOutcome::Rejected) }
        };
        assert_eq!(s.poll(&mut invoke, &cancel).await, 1);
        assert_eq!(calls, vec![first]);
        assert!(s.ledger().last_fired(&first).is_some());
        assert!(s.ledger().last_fired(&second).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let clock = ManualClock::new(at(9, 0, 0));
        let mut s = TriggerScheduler::new(vec![ScheduleEntry { hour: 8, minute: 0 }], clock);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            trigger.cancel();
        });

        let mut calls = 0;
        s.run(
            |_: ScheduleEntry| {
                calls += 1;
                async { Ok(RunOutcome::Confirmed) }
            },
            &cancel,
        )
        .await;
        assert_eq!(calls, 0);
    }
}
