use chrono::{DateTime, Duration, TimeZone};

use super::ScheduleEntry;

/// Civil fire times of `entries` in `(now, now + hours]`, soonest first.
///
/// A time that does not exist on some day (spring-forward gap) is skipped for
/// that day; a time that occurs twice (fall-back fold) is listed once, at its
/// first occurrence.
pub fn upcoming<Tz: TimeZone>(
    entries: &[ScheduleEntry],
    now: &DateTime<Tz>,
    hours: u64,
) -> Vec<(DateTime<Tz>, ScheduleEntry)> {
    let tz = now.timezone();
    let hours = i64::try_from(hours).unwrap_or(i64::MAX).min(24 * 366);
    let end = now.clone() + Duration::hours(hours);

    let mut out = Vec::new();
    for day in now.date_naive().iter_days() {
        if day > end.date_naive() {
            break;
        }
        for entry in entries {
            let Some(local) = day.and_hms_opt(entry.hour, entry.minute, 0) else {
                continue;
            };
            let Some(at) = tz.from_local_datetime(&local).earliest() else {
                continue;
            };
            if at > *now && at <= end {
                out.push((at, *entry));
            }
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    out
}
