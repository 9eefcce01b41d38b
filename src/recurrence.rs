//! Recurrence evaluation - computes the next firing instant for a spec
//!
//! All computation happens in local wall-clock time and is converted to UTC
//! at the end, so a 09:00 schedule stays 09:00 across DST shifts. Candidates
//! are derived from `after`, never from a stored previous occurrence, which
//! means an engine that was offline rolls forward to the next valid
//! occurrence instead of replaying a backlog. Pure and deterministic; no I/O.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::{RecurrenceSpec, TimeOfDay};

/// Compute the next firing instant strictly after `after`.
///
/// Returns None for a one-shot whose instant has passed (the caller expires
/// it) and for event-relative specs, which are resolved externally against
/// supplied event times via [`event_offset`].
pub fn next_occurrence(spec: &RecurrenceSpec, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    match spec {
        RecurrenceSpec::OneShot { at } => {
            if *at > after {
                Some(*at)
            } else {
                None
            }
        }
        RecurrenceSpec::Weekly { days, at } => {
            if days.is_empty() {
                return None;
            }
            next_local_occurrence(after, tz, *at, |date| days.contains(&date.weekday()))
        }
        RecurrenceSpec::DailyCheckin { at } => next_local_occurrence(after, tz, *at, |_| true),
        RecurrenceSpec::RelativeToEvent { .. } => None,
    }
}

/// The firing instant for an event-relative trigger given an event start.
pub fn event_offset(event_start: DateTime<Utc>, minutes_before: i64) -> DateTime<Utc> {
    event_start - Duration::minutes(minutes_before)
}

/// The local calendar date of an instant, used for per-day idempotence keys.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Scan forward day by day from `after`'s local date for the first date
/// accepted by `matches` whose wall-clock time resolves strictly later
/// than `after`.
fn next_local_occurrence(
    after: DateTime<Utc>,
    tz: Tz,
    at: TimeOfDay,
    matches: impl Fn(NaiveDate) -> bool,
) -> Option<DateTime<Utc>> {
    let start_date = after.with_timezone(&tz).date_naive();

    // 8 days covers every weekday even when today's slot has already passed
    for offset in 0..=8 {
        let date = start_date + Duration::days(offset);
        if !matches(date) {
            continue;
        }
        let naive = date.and_hms_opt(at.hour, at.minute, 0)?;
        if let Some(instant) = resolve_local(tz, naive) {
            if instant > after {
                return Some(instant);
            }
        }
    }

    None
}

/// Resolve a local wall-clock time to a UTC instant.
///
/// Fall-back ambiguity takes the earlier instant; a time landing in a
/// spring-forward gap rolls forward one hour, preserving wall-clock intent.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Some(dt.with_timezone(&Utc));
    }
    let shifted = naive + Duration::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
