//! Domain types for Remindr
//!
//! This module contains all core domain types:
//! - Trigger: a scheduled unit of work with a firing policy and status
//! - TaskResult: the recorded outcome of one firing
//! - Alert: an ephemeral proactive notification with delivery state
//! - CalendarEvent / MeetingWarning: calendar inputs and derived lead alerts

pub mod alert;
pub mod calendar;
pub mod task_result;
pub mod trigger;

pub use alert::{Alert, AlertAction, AlertCategory, DeliveryState, SNOOZE_MARKER};
pub use calendar::{CalendarEvent, MeetingWarning};
pub use task_result::{ResultStatus, TaskResult};
pub use trigger::{RecurrenceSpec, TimeOfDay, Trigger, TriggerKind, TriggerStatus};
