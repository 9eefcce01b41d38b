//! Notification gateway - per-alert delivery state machine.
//!
//! An alert moves `Queued → Delivered → {Responded, Snoozed, Dismissed,
//! Expired}`; `Snoozed` re-enters `Queued` after the snooze delay. Duplicate
//! actions on a resolved alert are no-ops. A platform delivery failure is
//! logged once and the alert left un-delivered; there is no automatic retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::domain::{Alert, AlertAction, DeliveryState};
use crate::notify::platform::{NotificationPlatform, NotificationRequest};
use crate::store::TriggerStore;

/// Gateway tuning knobs
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Delay before a snoozed alert is re-queued
    pub snooze_delay: Duration,
    /// Snoozes allowed per alert; past this, a snooze dismisses instead
    pub max_snooze_count: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            snooze_delay: Duration::from_secs(15 * 60),
            max_snooze_count: 3,
        }
    }
}

/// Events the gateway emits toward the host
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The user chose "respond": surface the host's primary interface
    /// with the alert body as context
    Respond { alert_id: String, context: String },
}

/// Per-alert delivery bookkeeping
#[derive(Debug, Clone)]
struct DeliveryRecord {
    alert: Alert,
    state: DeliveryState,
    snooze_count: u32,
}

/// A snoozed alert waiting for re-delivery
#[derive(Debug, Clone)]
struct SnoozedEntry {
    alert: Alert,
    due_at: DateTime<Utc>,
}

/// Delivers alerts through the platform and tracks their lifecycle.
pub struct NotificationGateway {
    platform: Arc<dyn NotificationPlatform>,
    store: Arc<Mutex<TriggerStore>>,
    config: GatewayConfig,
    deliveries: Mutex<HashMap<String, DeliveryRecord>>,
    snoozed: Mutex<Vec<SnoozedEntry>>,
    event_tx: broadcast::Sender<GatewayEvent>,
    delivery_failed: AtomicBool,
}

impl NotificationGateway {
    /// Create a new gateway over the given platform and store.
    pub fn new(
        platform: Arc<dyn NotificationPlatform>,
        store: Arc<Mutex<TriggerStore>>,
        config: GatewayConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            platform,
            store,
            config,
            deliveries: Mutex::new(HashMap::new()),
            snoozed: Mutex::new(Vec::new()),
            event_tx,
            delivery_failed: AtomicBool::new(false),
        }
    }

    /// Get a receiver for gateway events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.event_tx.subscribe()
    }

    /// True once any delivery has failed; surfaced as a one-time status
    /// indicator, never as repeated alerts.
    pub fn delivery_degraded(&self) -> bool {
        self.delivery_failed.load(Ordering::SeqCst)
    }

    /// Ask the platform for notification permission.
    ///
    /// A denial degrades delivery status but never errors; the scheduler
    /// keeps running without notifications.
    pub async fn ensure_authorized(&self) -> bool {
        match self.platform.request_authorization().await {
            Ok(true) => true,
            Ok(false) => {
                if !self.delivery_failed.swap(true, Ordering::SeqCst) {
                    warn!("Notification authorization denied");
                }
                false
            }
            Err(e) => {
                if !self.delivery_failed.swap(true, Ordering::SeqCst) {
                    warn!("Notification authorization check failed: {}", e);
                }
                false
            }
        }
    }

    /// Deliver an alert through the platform.
    ///
    /// Returns the resulting state: `Delivered` on success, `Queued` when
    /// the platform refused (the alert stays un-delivered, no retry).
    pub async fn deliver(&self, alert: Alert) -> DeliveryState {
        {
            let mut deliveries = self.deliveries.lock().unwrap();
            let record = deliveries
                .entry(alert.id.clone())
                .or_insert_with(|| DeliveryRecord {
                    alert: alert.clone(),
                    state: DeliveryState::Queued,
                    snooze_count: 0,
                });
            record.alert = alert.clone();
            record.state = DeliveryState::Queued;
        }

        let request = NotificationRequest {
            id: alert.id.clone(),
            title: alert.title.clone(),
            body: alert.body.clone(),
            category: alert.category,
            actions: alert.category.actions().to_vec(),
            deliver_at: None,
        };

        let state = match self.platform.send(request).await {
            Ok(()) => DeliveryState::Delivered,
            Err(e) => {
                if !self.delivery_failed.swap(true, Ordering::SeqCst) {
                    error!(alert_id = %alert.id, "Notification delivery failed: {}", e);
                } else {
                    debug!(alert_id = %alert.id, "Notification delivery failed: {}", e);
                }
                DeliveryState::Queued
            }
        };

        let mut deliveries = self.deliveries.lock().unwrap();
        if let Some(record) = deliveries.get_mut(&alert.id) {
            record.state = state;
        }
        state
    }

    /// Apply a user action to an alert at the current instant.
    pub async fn handle_action(&self, alert_id: &str, action: AlertAction) {
        self.handle_action_at(alert_id, action, Utc::now()).await;
    }

    /// Apply a user action with an explicit clock.
    pub async fn handle_action_at(&self, alert_id: &str, action: AlertAction, now: DateTime<Utc>) {
        let outcome = {
            let mut deliveries = self.deliveries.lock().unwrap();
            let Some(record) = deliveries.get_mut(alert_id) else {
                warn!(alert_id = %alert_id, "Action on unknown alert ignored");
                return;
            };

            // Duplicate actions on a resolved alert are no-ops
            if record.state.is_resolved() {
                debug!(alert_id = %alert_id, state = ?record.state, "Action on resolved alert ignored");
                return;
            }

            match action {
                AlertAction::Respond => {
                    record.state = DeliveryState::Responded;
                    Some(ActionOutcome::Respond {
                        context: record.alert.body.clone(),
                    })
                }
                AlertAction::Snooze => {
                    if record.snooze_count >= self.config.max_snooze_count {
                        record.state = DeliveryState::Dismissed;
                        None
                    } else {
                        record.snooze_count += 1;
                        record.state = DeliveryState::Snoozed;
                        Some(ActionOutcome::Snoozed {
                            alert: record.alert.snoozed_copy(),
                            snooze_count: record.snooze_count,
                        })
                    }
                }
                AlertAction::Dismiss => {
                    record.state = DeliveryState::Dismissed;
                    None
                }
            }
        };

        match outcome {
            Some(ActionOutcome::Respond { context }) => {
                // Ignore send errors (no subscribers is fine)
                let _ = self.event_tx.send(GatewayEvent::Respond {
                    alert_id: alert_id.to_string(),
                    context,
                });
            }
            Some(ActionOutcome::Snoozed {
                alert,
                snooze_count,
            }) => {
                let delay =
                    chrono::Duration::from_std(self.config.snooze_delay).unwrap_or_default();
                self.snoozed.lock().unwrap().push(SnoozedEntry {
                    alert,
                    due_at: now + delay,
                });
                if let Err(e) = self
                    .store
                    .lock()
                    .unwrap()
                    .save_snooze_count(alert_id, snooze_count)
                {
                    warn!(alert_id = %alert_id, "Failed to persist snooze counter: {}", e);
                }
            }
            None => {}
        }
    }

    /// Platform callback entry point: parse the action identifier and apply.
    pub async fn handle_platform_action(&self, alert_id: &str, identifier: &str) {
        match AlertAction::parse(identifier) {
            Some(action) => self.handle_action(alert_id, action).await,
            None => warn!(alert_id = %alert_id, identifier = %identifier, "Unknown action identifier"),
        }
    }

    /// Re-deliver snoozed alerts whose delay has elapsed. Returns how many
    /// were re-delivered.
    pub async fn due_requeues(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<Alert> = {
            let mut snoozed = self.snoozed.lock().unwrap();
            let (ready, waiting): (Vec<_>, Vec<_>) =
                snoozed.drain(..).partition(|entry| entry.due_at <= now);
            *snoozed = waiting;
            ready.into_iter().map(|entry| entry.alert).collect()
        };

        let count = due.len();
        for alert in due {
            self.deliver(alert).await;
        }
        count
    }

    /// The earliest pending requeue instant, for the scheduler's deadline.
    pub fn next_requeue_at(&self) -> Option<DateTime<Utc>> {
        self.snoozed
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.due_at)
            .min()
    }

    /// Expire an alert that is no longer actionable (e.g. its meeting
    /// started). Resolved alerts are left alone.
    pub fn expire(&self, alert_id: &str) {
        let mut deliveries = self.deliveries.lock().unwrap();
        if let Some(record) = deliveries.get_mut(alert_id) {
            if !record.state.is_resolved() {
                record.state = DeliveryState::Expired;
            }
        }
        // Drop any pending requeue for it as well
        self.snoozed
            .lock()
            .unwrap()
            .retain(|entry| entry.alert.id != alert_id);
    }

    /// Current delivery state of an alert, if known.
    pub fn delivery_state(&self, alert_id: &str) -> Option<DeliveryState> {
        self.deliveries
            .lock()
            .unwrap()
            .get(alert_id)
            .map(|record| record.state)
    }

    /// Snooze count of an alert (0 if unknown or never snoozed).
    pub fn snooze_count(&self, alert_id: &str) -> u32 {
        self.deliveries
            .lock()
            .unwrap()
            .get(alert_id)
            .map(|record| record.snooze_count)
            .unwrap_or(0)
    }
}

/// What a locked action decided to do once the lock is released
enum ActionOutcome {
    Respond { context: String },
    Snoozed { alert: Alert, snooze_count: u32 },
}
