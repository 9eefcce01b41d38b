//! Calendar events and derived meeting warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{Alert, AlertCategory};

/// A calendar event supplied by the external calendar source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    /// Returns true if the event is currently in progress
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }

    /// Title shown in alerts, with a fallback for untitled events
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Meeting"
        } else {
            &self.title
        }
    }
}

/// A derived lead-time warning for an upcoming meeting. Never persisted;
/// only its per-day firing mark is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingWarning {
    pub event_id: String,
    pub event_title: String,
    pub event_time: DateTime<Utc>,
    pub minutes_before: i64,
}

impl MeetingWarning {
    /// Render this warning as a deliverable alert
    pub fn to_alert(&self) -> Alert {
        Alert::new(
            &self.event_title,
            &format!(
                "{} starts in {} minutes",
                self.event_title, self.minutes_before
            ),
            AlertCategory::Meeting,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(start_hour: u32, end_hour: u32) -> CalendarEvent {
        CalendarEvent {
            id: "evt-1".to_string(),
            title: "Design review".to_string(),
            start: Utc.with_ymd_and_hms(2024, 6, 3, start_hour, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 6, 3, end_hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_event_is_current() {
        let e = event(10, 11);
        assert!(!e.is_current(Utc.with_ymd_and_hms(2024, 6, 3, 9, 59, 0).unwrap()));
        assert!(e.is_current(Utc.with_ymd_and_hms(2024, 6, 3, 10, 30, 0).unwrap()));
        assert!(!e.is_current(Utc.with_ymd_and_hms(2024, 6, 3, 11, 1, 0).unwrap()));
    }

    #[test]
    fn test_display_title_fallback() {
        let mut e = event(10, 11);
        assert_eq!(e.display_title(), "Design review");
        e.title = "  ".to_string();
        assert_eq!(e.display_title(), "Meeting");
    }

    #[test]
    fn test_warning_to_alert() {
        let warning = MeetingWarning {
            event_id: "evt-1".to_string(),
            event_title: "Design review".to_string(),
            event_time: Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap(),
            minutes_before: 15,
        };
        let alert = warning.to_alert();
        assert_eq!(alert.title, "Design review");
        assert_eq!(alert.body, "Design review starts in 15 minutes");
        assert_eq!(alert.category, AlertCategory::Meeting);
    }
}
