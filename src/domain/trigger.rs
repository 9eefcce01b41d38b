//! Trigger record and recurrence spec types
//!
//! A Trigger is the core abstraction in Remindr: a scheduled unit of work
//! with a firing policy and a status. The firing policy is a tagged
//! RecurrenceSpec rather than a free-text rule string, so nothing downstream
//! ever re-parses schedules.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{RemindrError, Result};
use crate::id::{generate_trigger_id, now_ms};

/// A fixed local wall-clock time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    /// Create a new time of day
    pub fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    /// Returns true if this is a representable wall-clock time
    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }
}

/// The firing policy of a trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecurrenceSpec {
    /// Fire once at an absolute instant
    OneShot { at: DateTime<Utc> },
    /// Fire on the given weekdays at a fixed local time
    Weekly { days: Vec<Weekday>, at: TimeOfDay },
    /// Fire a fixed number of minutes before an externally supplied event
    RelativeToEvent { minutes_before: i64 },
    /// Fire every day at a fixed local time
    DailyCheckin { at: TimeOfDay },
}

impl RecurrenceSpec {
    /// The trigger kind this spec implies
    pub fn kind(&self) -> TriggerKind {
        match self {
            RecurrenceSpec::OneShot { .. } => TriggerKind::Time,
            RecurrenceSpec::Weekly { .. } => TriggerKind::Recurring,
            RecurrenceSpec::RelativeToEvent { .. } => TriggerKind::Event,
            RecurrenceSpec::DailyCheckin { .. } => TriggerKind::Checkin,
        }
    }

    /// Validate the spec, returning a parse error for malformed schedules
    pub fn validate(&self) -> Result<()> {
        match self {
            RecurrenceSpec::OneShot { .. } => Ok(()),
            RecurrenceSpec::Weekly { days, at } => {
                if days.is_empty() {
                    return Err(RemindrError::ScheduleParse(
                        "weekly spec has no weekdays".to_string(),
                    ));
                }
                if !at.is_valid() {
                    return Err(RemindrError::ScheduleParse(format!(
                        "time of day {:02}:{:02} out of range",
                        at.hour, at.minute
                    )));
                }
                Ok(())
            }
            RecurrenceSpec::RelativeToEvent { minutes_before } => {
                if *minutes_before < 0 {
                    return Err(RemindrError::ScheduleParse(format!(
                        "event lead time must be non-negative, got {}",
                        minutes_before
                    )));
                }
                Ok(())
            }
            RecurrenceSpec::DailyCheckin { at } => {
                if !at.is_valid() {
                    return Err(RemindrError::ScheduleParse(format!(
                        "time of day {:02}:{:02} out of range",
                        at.hour, at.minute
                    )));
                }
                Ok(())
            }
        }
    }
}

/// The five kinds of triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Time,
    Recurring,
    Event,
    Checkin,
    Manual,
}

impl TriggerKind {
    /// String form used in the store index
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Time => "time",
            TriggerKind::Recurring => "recurring",
            TriggerKind::Event => "event",
            TriggerKind::Checkin => "checkin",
            TriggerKind::Manual => "manual",
        }
    }
}

/// Status of a trigger's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    /// Eligible for arming and firing
    Active,
    /// User-suspended, never fires
    Paused,
    /// One-shot that has fired
    Completed,
    /// Missed one-shot, or recurring trigger past the failure threshold
    Expired,
}

impl TriggerStatus {
    /// String form used in the store index
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerStatus::Active => "active",
            TriggerStatus::Paused => "paused",
            TriggerStatus::Completed => "completed",
            TriggerStatus::Expired => "expired",
        }
    }

    /// Returns true if the trigger will never fire again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TriggerStatus::Completed | TriggerStatus::Expired)
    }
}

/// A scheduled unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique identifier ("trig-1738300800123-a1b2")
    pub id: String,

    /// Human-readable name shown in listings and alerts
    pub name: String,

    /// What kind of trigger: time, recurring, event, checkin, or manual
    pub kind: TriggerKind,

    /// Firing policy (None for manual-only triggers)
    pub spec: Option<RecurrenceSpec>,

    /// Work payload handed to the task runner
    pub prompt: String,

    /// Current lifecycle status
    pub status: TriggerStatus,

    /// Next computed firing instant (None when unarmed)
    pub next_run_at: Option<DateTime<Utc>>,

    /// Instant of the most recent firing
    pub last_run_at: Option<DateTime<Utc>>,

    /// Total completed firings
    pub run_count: u32,

    /// Failures since the last success, for the expiry policy
    pub consecutive_failures: u32,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Trigger {
    fn base(name: &str, prompt: &str, kind: TriggerKind, spec: Option<RecurrenceSpec>) -> Self {
        let now = now_ms();
        Self {
            id: generate_trigger_id(),
            name: name.to_string(),
            kind,
            spec,
            prompt: prompt.to_string(),
            status: TriggerStatus::Active,
            next_run_at: None,
            last_run_at: None,
            run_count: 0,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a one-shot trigger firing at an absolute instant
    pub fn new_one_shot(name: &str, prompt: &str, at: DateTime<Utc>) -> Self {
        Self::base(
            name,
            prompt,
            TriggerKind::Time,
            Some(RecurrenceSpec::OneShot { at }),
        )
    }

    /// Create a weekly trigger firing on the given weekdays at a local time
    pub fn new_weekly(name: &str, prompt: &str, days: Vec<Weekday>, at: TimeOfDay) -> Self {
        Self::base(
            name,
            prompt,
            TriggerKind::Recurring,
            Some(RecurrenceSpec::Weekly { days, at }),
        )
    }

    /// Create a daily check-in trigger at a local time
    pub fn new_checkin(name: &str, prompt: &str, at: TimeOfDay) -> Self {
        Self::base(
            name,
            prompt,
            TriggerKind::Checkin,
            Some(RecurrenceSpec::DailyCheckin { at }),
        )
    }

    /// Create an event-relative trigger firing before calendar events
    pub fn new_event(name: &str, prompt: &str, minutes_before: i64) -> Self {
        Self::base(
            name,
            prompt,
            TriggerKind::Event,
            Some(RecurrenceSpec::RelativeToEvent { minutes_before }),
        )
    }

    /// Create a manual trigger, runnable only via run-now
    pub fn new_manual(name: &str, prompt: &str) -> Self {
        Self::base(name, prompt, TriggerKind::Manual, None)
    }

    /// Returns true if the trigger re-arms after a successful firing
    pub fn is_recurring(&self) -> bool {
        matches!(
            self.kind,
            TriggerKind::Recurring | TriggerKind::Checkin | TriggerKind::Event
        )
    }

    /// Returns true if the trigger fires at most once per local calendar day
    pub fn is_daily_scoped(&self) -> bool {
        self.kind == TriggerKind::Checkin
    }

    /// Update the timestamp
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_of_day_validity() {
        assert!(TimeOfDay::new(0, 0).is_valid());
        assert!(TimeOfDay::new(23, 59).is_valid());
        assert!(!TimeOfDay::new(24, 0).is_valid());
        assert!(!TimeOfDay::new(9, 60).is_valid());
    }

    #[test]
    fn test_spec_kind_mapping() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(
            RecurrenceSpec::OneShot { at }.kind(),
            TriggerKind::Time
        );
        assert_eq!(
            RecurrenceSpec::Weekly {
                days: vec![Weekday::Mon],
                at: TimeOfDay::new(9, 0)
            }
            .kind(),
            TriggerKind::Recurring
        );
        assert_eq!(
            RecurrenceSpec::RelativeToEvent { minutes_before: 15 }.kind(),
            TriggerKind::Event
        );
        assert_eq!(
            RecurrenceSpec::DailyCheckin {
                at: TimeOfDay::new(17, 30)
            }
            .kind(),
            TriggerKind::Checkin
        );
    }

    #[test]
    fn test_spec_validate_rejects_empty_weekdays() {
        let spec = RecurrenceSpec::Weekly {
            days: vec![],
            at: TimeOfDay::new(9, 0),
        };
        assert!(matches!(
            spec.validate(),
            Err(RemindrError::ScheduleParse(_))
        ));
    }

    #[test]
    fn test_spec_validate_rejects_bad_time() {
        let spec = RecurrenceSpec::DailyCheckin {
            at: TimeOfDay::new(25, 0),
        };
        assert!(matches!(
            spec.validate(),
            Err(RemindrError::ScheduleParse(_))
        ));
    }

    #[test]
    fn test_spec_validate_rejects_negative_lead() {
        let spec = RecurrenceSpec::RelativeToEvent { minutes_before: -5 };
        assert!(matches!(
            spec.validate(),
            Err(RemindrError::ScheduleParse(_))
        ));
    }

    #[test]
    fn test_spec_validate_accepts_good_specs() {
        assert!(
            RecurrenceSpec::Weekly {
                days: vec![Weekday::Mon, Weekday::Fri],
                at: TimeOfDay::new(9, 0)
            }
            .validate()
            .is_ok()
        );
        assert!(
            RecurrenceSpec::RelativeToEvent { minutes_before: 0 }
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(TriggerStatus::Completed.is_terminal());
        assert!(TriggerStatus::Expired.is_terminal());
        assert!(!TriggerStatus::Active.is_terminal());
        assert!(!TriggerStatus::Paused.is_terminal());
    }

    #[test]
    fn test_new_one_shot_fields() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let trigger = Trigger::new_one_shot("Morning brief", "Summarize my day", at);

        assert_eq!(trigger.kind, TriggerKind::Time);
        assert_eq!(trigger.status, TriggerStatus::Active);
        assert_eq!(trigger.spec, Some(RecurrenceSpec::OneShot { at }));
        assert!(trigger.next_run_at.is_none());
        assert!(trigger.last_run_at.is_none());
        assert_eq!(trigger.run_count, 0);
        assert!(!trigger.is_recurring());
        assert!(!trigger.is_daily_scoped());
    }

    #[test]
    fn test_new_checkin_is_daily_scoped() {
        let trigger = Trigger::new_checkin("Evening check-in", "How did today go?", TimeOfDay::new(17, 0));
        assert!(trigger.is_recurring());
        assert!(trigger.is_daily_scoped());
    }

    #[test]
    fn test_new_manual_has_no_spec() {
        let trigger = Trigger::new_manual("Ad hoc", "Run the report");
        assert_eq!(trigger.kind, TriggerKind::Manual);
        assert!(trigger.spec.is_none());
        assert!(!trigger.is_recurring());
    }

    #[test]
    fn test_trigger_serialization_roundtrip() {
        let trigger = Trigger::new_weekly(
            "Standup notes",
            "Draft standup notes",
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
            TimeOfDay::new(9, 0),
        );
        let json = serde_json::to_string(&trigger).expect("serialize");
        let parsed: Trigger = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed.id, trigger.id);
        assert_eq!(parsed.kind, trigger.kind);
        assert_eq!(parsed.spec, trigger.spec);
        assert_eq!(parsed.status, trigger.status);
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&TriggerKind::Checkin).unwrap(),
            "\"checkin\""
        );
        assert_eq!(
            serde_json::to_string(&TriggerStatus::Expired).unwrap(),
            "\"expired\""
        );
    }

    #[test]
    fn test_touch_updates_timestamp() {
        let mut trigger = Trigger::new_manual("Test", "test");
        let original = trigger.updated_at;

        std::thread::sleep(std::time::Duration::from_millis(2));
        trigger.touch();

        assert!(trigger.updated_at >= original);
    }
}
