//! Proactive alerts and their per-delivery state machine.
//!
//! Alerts are ephemeral: the gateway keeps delivery state in memory and only
//! snooze counters are persisted. An alert moves
//! `Queued → Delivered → {Responded, Snoozed, Dismissed, Expired}`, and
//! `Snoozed` re-enters `Queued` after the snooze delay.

use serde::{Deserialize, Serialize};

use crate::id::generate_alert_id;

/// Marker appended to the title of a re-queued snoozed alert
pub const SNOOZE_MARKER: &str = "(snoozed)";

/// Category of a proactive alert, driving its platform action set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Meeting,
    Briefing,
    Suggestion,
    Reminder,
}

impl AlertCategory {
    /// String form used as the platform category identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Meeting => "meeting",
            AlertCategory::Briefing => "briefing",
            AlertCategory::Suggestion => "suggestion",
            AlertCategory::Reminder => "reminder",
        }
    }

    /// The actions offered on a delivered alert of this category
    pub fn actions(&self) -> &'static [AlertAction] {
        match self {
            AlertCategory::Meeting => &[AlertAction::Respond, AlertAction::Snooze],
            AlertCategory::Briefing => &[AlertAction::Respond, AlertAction::Dismiss],
            AlertCategory::Suggestion | AlertCategory::Reminder => &[
                AlertAction::Respond,
                AlertAction::Snooze,
                AlertAction::Dismiss,
            ],
        }
    }
}

/// A user action taken on a delivered alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Respond,
    Snooze,
    Dismiss,
}

impl AlertAction {
    /// Platform action identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertAction::Respond => "respond",
            AlertAction::Snooze => "snooze",
            AlertAction::Dismiss => "dismiss",
        }
    }

    /// Parse a platform action identifier
    pub fn parse(identifier: &str) -> Option<Self> {
        match identifier {
            "respond" => Some(AlertAction::Respond),
            "snooze" => Some(AlertAction::Snooze),
            "dismiss" => Some(AlertAction::Dismiss),
            _ => None,
        }
    }
}

/// Delivery lifecycle of a single alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Waiting for platform delivery
    Queued,
    /// Shown to the user, awaiting action
    Delivered,
    /// User asked to open the host interface
    Responded,
    /// Deferred, will re-queue after the snooze delay
    Snoozed,
    /// User dismissed it
    Dismissed,
    /// Aged out or exceeded the snooze cap
    Expired,
}

impl DeliveryState {
    /// Returns true once no further action can change the alert
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            DeliveryState::Responded | DeliveryState::Dismissed | DeliveryState::Expired
        )
    }
}

/// An ephemeral proactive alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub body: String,
    pub category: AlertCategory,
}

impl Alert {
    /// Create a new alert with a fresh id
    pub fn new(title: &str, body: &str, category: AlertCategory) -> Self {
        Self {
            id: generate_alert_id(),
            title: title.to_string(),
            body: body.to_string(),
            category,
        }
    }

    /// The same content re-queued after a snooze, marked once in the title
    pub fn snoozed_copy(&self) -> Self {
        let title = if self.title.ends_with(SNOOZE_MARKER) {
            self.title.clone()
        } else {
            format!("{} {}", self.title, SNOOZE_MARKER)
        };
        Self {
            id: self.id.clone(),
            title,
            body: self.body.clone(),
            category: self.category,
        }
    }
}
