//! Calendar source boundary and meeting warning generation.
//!
//! Warnings are derived fresh on every refresh from the supplied events; the
//! only persisted piece is the (event, lead, local date) firing mark that
//! keeps a warning from firing twice in a day.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::domain::{CalendarEvent, MeetingWarning};
use crate::recurrence::{event_offset, local_date};
use crate::store::TriggerStore;

/// Boundary contract to the external calendar data source.
///
/// Missing permission or a broken export yields an empty list, never an
/// error; the scheduler must keep running without calendar data.
pub trait CalendarSource: Send + Sync {
    fn todays_events(&self) -> Vec<CalendarEvent>;
}

/// Calendar source reading an exported events JSON file.
pub struct JsonCalendarSource {
    path: PathBuf,
}

impl JsonCalendarSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CalendarSource for JsonCalendarSource {
    fn todays_events(&self) -> Vec<CalendarEvent> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No calendar data at {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<CalendarEvent>>(&content) {
            Ok(events) => events,
            Err(e) => {
                warn!("Unparseable calendar export {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }
}

/// In-memory calendar source for tests.
#[derive(Default)]
pub struct MockCalendar {
    events: Mutex<Vec<CalendarEvent>>,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_events(&self, events: Vec<CalendarEvent>) {
        *self.events.lock().unwrap() = events;
    }
}

impl CalendarSource for MockCalendar {
    fn todays_events(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Derives lead-time warnings from today's events.
pub struct MeetingWarningGenerator {
    lead_times: Vec<i64>,
    tz: Tz,
}

impl MeetingWarningGenerator {
    /// Create a generator for the given lead times (minutes).
    pub fn new(lead_times: Vec<i64>, tz: Tz) -> Self {
        Self { lead_times, tz }
    }

    /// Compute the warnings due at `now` and mark each (event, lead) pair as
    /// fired for today, so repeated refreshes emit each warning once.
    ///
    /// A warning is due when `event_start - lead` has passed but the event
    /// has not started yet.
    pub fn refresh(
        &self,
        events: &[CalendarEvent],
        now: DateTime<Utc>,
        store: &mut TriggerStore,
    ) -> Vec<MeetingWarning> {
        let today = local_date(now, self.tz);
        let mut warnings = Vec::new();

        for event in events {
            if event.start <= now {
                continue;
            }

            for &lead in &self.lead_times {
                if event_offset(event.start, lead) > now {
                    continue;
                }

                match store.has_warning_mark(&event.id, lead, today) {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(event_id = %event.id, "Warning mark lookup failed: {}", e);
                        continue;
                    }
                }

                if let Err(e) = store.record_warning_mark(&event.id, lead, today) {
                    warn!(event_id = %event.id, "Failed to record warning mark: {}", e);
                    continue;
                }

                warnings.push(MeetingWarning {
                    event_id: event.id.clone(),
                    event_title: event.display_title().to_string(),
                    event_time: event.start,
                    minutes_before: lead,
                });
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz::UTC;
    use tempfile::TempDir;

    fn store() -> (TriggerStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = TriggerStore::open_at(temp.path()).unwrap();
        (store, temp)
    }

    fn event_at(id: &str, start: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("Event {}", id),
            start,
            end: start + chrono::Duration::hours(1),
        }
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    #[test]
    fn test_no_warning_before_lead_window() {
        let (mut store, _temp) = store();
        let generator = MeetingWarningGenerator::new(vec![15], UTC);
        let events = vec![event_at("evt-1", t(10, 0))];

        // 20 minutes out: the 15-minute lead has not passed yet
        let warnings = generator.refresh(&events, t(9, 40), &mut store);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_exactly_one_warning_at_lead_under_repeated_evaluation() {
        let (mut store, _temp) = store();
        let generator = MeetingWarningGenerator::new(vec![15], UTC);
        let events = vec![event_at("evt-1", t(10, 0))];

        let warnings = generator.refresh(&events, t(9, 45), &mut store);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].event_id, "evt-1");
        assert_eq!(warnings[0].minutes_before, 15);

        // Re-evaluating at the same and later instants emits nothing new
        assert!(generator.refresh(&events, t(9, 45), &mut store).is_empty());
        assert!(generator.refresh(&events, t(9, 50), &mut store).is_empty());
    }

    #[test]
    fn test_started_event_produces_no_warning() {
        let (mut store, _temp) = store();
        let generator = MeetingWarningGenerator::new(vec![15], UTC);
        let events = vec![event_at("evt-1", t(10, 0))];

        let warnings = generator.refresh(&events, t(10, 0), &mut store);
        assert!(warnings.is_empty());
        let warnings = generator.refresh(&events, t(10, 30), &mut store);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_multiple_lead_times_fire_independently() {
        let (mut store, _temp) = store();
        let generator = MeetingWarningGenerator::new(vec![5, 15], UTC);
        let events = vec![event_at("evt-1", t(10, 0))];

        let warnings = generator.refresh(&events, t(9, 45), &mut store);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].minutes_before, 15);

        let warnings = generator.refresh(&events, t(9, 55), &mut store);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].minutes_before, 5);
    }

    #[test]
    fn test_untitled_event_gets_fallback_title() {
        let (mut store, _temp) = store();
        let generator = MeetingWarningGenerator::new(vec![15], UTC);
        let mut event = event_at("evt-1", t(10, 0));
        event.title = String::new();

        let warnings = generator.refresh(&[event], t(9, 45), &mut store);
        assert_eq!(warnings[0].event_title, "Meeting");
    }

    #[test]
    fn test_json_calendar_source_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let source = JsonCalendarSource::new(temp.path().join("absent.json"));
        assert!(source.todays_events().is_empty());
    }

    #[test]
    fn test_json_calendar_source_bad_json_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.json");
        fs::write(&path, "not json").unwrap();
        let source = JsonCalendarSource::new(path);
        assert!(source.todays_events().is_empty());
    }

    #[test]
    fn test_json_calendar_source_parses_events() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.json");
        let events = vec![event_at("evt-1", t(10, 0))];
        fs::write(&path, serde_json::to_string(&events).unwrap()).unwrap();

        let source = JsonCalendarSource::new(path);
        let loaded = source.todays_events();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "evt-1");
    }

    #[test]
    fn test_mock_calendar_roundtrip() {
        let calendar = MockCalendar::new();
        assert!(calendar.todays_events().is_empty());
        calendar.set_events(vec![event_at("evt-1", t(10, 0))]);
        assert_eq!(calendar.todays_events().len(), 1);
    }
}
