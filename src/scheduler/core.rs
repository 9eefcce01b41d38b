//! Scheduler core - the per-trigger state machine.
//!
//! A trigger moves `Idle → Armed → Due → Firing → {Completed | re-Armed |
//! Expired}`. The core owns the trigger table, in-flight flags, and per-day
//! idempotence checks; it performs no runner or notification I/O itself. The
//! service wraps it in a single mutex and dispatches the tickets it hands
//! out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::domain::{
    CalendarEvent, RecurrenceSpec, TaskResult, Trigger, TriggerKind, TriggerStatus,
};
use crate::error::{RemindrError, Result};
use crate::recurrence::{event_offset, local_date, next_occurrence};
use crate::runner::RunnerError;
use crate::store::TriggerStore;

/// Runtime arming state of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    /// Not scheduled: manual, paused, terminal, or awaiting event resolution
    Idle,
    /// Waiting for its next firing instant
    Armed,
    /// Executing; no second firing may start
    Firing,
}

struct TriggerEntry {
    trigger: Trigger,
    arm: ArmState,
}

/// Scheduler policy knobs
#[derive(Debug, Clone)]
pub struct CorePolicy {
    /// Timezone for wall-clock recurrence and idempotence keys
    pub tz: Tz,
    /// Consecutive failures before a trigger is expired (None: never)
    pub failure_threshold: Option<u32>,
}

impl Default for CorePolicy {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Tz::UTC,
            failure_threshold: None,
        }
    }
}

/// Central state machine owning all triggers.
pub struct SchedulerCore {
    store: Arc<Mutex<TriggerStore>>,
    policy: CorePolicy,
    entries: HashMap<String, TriggerEntry>,
}

impl SchedulerCore {
    /// Reconstruct the core from persisted records.
    ///
    /// Statuses come back exactly as saved; an interrupted firing is never
    /// assumed to have completed. Stale one-shots expire here instead of
    /// back-firing, and recurring triggers roll forward to their next valid
    /// occurrence.
    pub fn load(store: Arc<Mutex<TriggerStore>>, policy: CorePolicy, now: DateTime<Utc>) -> Result<Self> {
        let triggers = store.lock().unwrap().list_triggers()?;

        let mut core = Self {
            store,
            policy,
            entries: HashMap::new(),
        };

        for trigger in triggers {
            let id = trigger.id.clone();
            core.entries.insert(
                id.clone(),
                TriggerEntry {
                    trigger,
                    arm: ArmState::Idle,
                },
            );
            core.arm(&id, now)?;
        }

        info!(count = core.entries.len(), "Scheduler core loaded");
        Ok(core)
    }

    /// Register a new trigger: validate, persist, arm.
    ///
    /// Malformed specs are rejected with a parse error and never armed.
    pub fn register(&mut self, trigger: Trigger, now: DateTime<Utc>) -> Result<()> {
        if self.entries.contains_key(&trigger.id) {
            return Err(RemindrError::InvalidState(format!(
                "trigger {} already registered",
                trigger.id
            )));
        }

        match (&trigger.spec, trigger.kind) {
            (None, TriggerKind::Manual) => {}
            (None, kind) => {
                return Err(RemindrError::ScheduleParse(format!(
                    "{} trigger requires a recurrence spec",
                    kind.as_str()
                )));
            }
            (Some(spec), kind) => {
                spec.validate()?;
                if spec.kind() != kind {
                    return Err(RemindrError::ScheduleParse(format!(
                        "spec implies kind {} but trigger says {}",
                        spec.kind().as_str(),
                        kind.as_str()
                    )));
                }
            }
        }

        let id = trigger.id.clone();
        self.entries.insert(
            id.clone(),
            TriggerEntry {
                trigger,
                arm: ArmState::Idle,
            },
        );
        self.arm(&id, now)?;
        Ok(())
    }

    /// Compute and persist a trigger's next firing instant.
    fn arm(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let tz = self.policy.tz;
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| RemindrError::TriggerNotFound(id.to_string()))?;

        if entry.arm == ArmState::Firing {
            return Ok(());
        }

        if entry.trigger.status != TriggerStatus::Active {
            entry.arm = ArmState::Idle;
            entry.trigger.next_run_at = None;
            return self.persist(id);
        }

        let Some(spec) = entry.trigger.spec.clone() else {
            // Manual triggers only run via run-now
            entry.arm = ArmState::Idle;
            entry.trigger.next_run_at = None;
            return self.persist(id);
        };

        match next_occurrence(&spec, now, tz) {
            Some(next) => {
                entry.trigger.next_run_at = Some(next);
                entry.arm = ArmState::Armed;
                debug!(trigger_id = %id, next_run = %next, "Trigger armed");
            }
            None => match spec {
                RecurrenceSpec::OneShot { .. } => {
                    // Missed with no completion recorded: expired, not
                    // back-fired
                    entry.trigger.status = if entry.trigger.run_count > 0 {
                        TriggerStatus::Completed
                    } else {
                        TriggerStatus::Expired
                    };
                    entry.trigger.next_run_at = None;
                    entry.arm = ArmState::Idle;
                    info!(trigger_id = %id, status = ?entry.trigger.status, "One-shot not armable");
                }
                RecurrenceSpec::RelativeToEvent { .. } => {
                    // Armed later, once calendar events are supplied
                    entry.trigger.next_run_at = None;
                    entry.arm = ArmState::Idle;
                }
                _ => {
                    entry.trigger.next_run_at = None;
                    entry.arm = ArmState::Idle;
                    warn!(trigger_id = %id, "Recurring spec produced no occurrence");
                }
            },
        }

        entry.trigger.touch();
        self.persist(id)
    }

    /// Write a trigger's current record to the store.
    fn persist(&self, id: &str) -> Result<()> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| RemindrError::TriggerNotFound(id.to_string()))?;
        self.store.lock().unwrap().save_trigger(&entry.trigger)
    }

    /// Arm event-relative triggers against freshly pulled calendar events.
    pub fn resolve_events(&mut self, events: &[CalendarEvent], now: DateTime<Utc>) {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.trigger.kind == TriggerKind::Event
                    && e.trigger.status == TriggerStatus::Active
                    && e.arm != ArmState::Firing
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            let minutes_before = match &entry.trigger.spec {
                Some(RecurrenceSpec::RelativeToEvent { minutes_before }) => *minutes_before,
                _ => continue,
            };

            // Earliest future offset instant across today's events
            let next = events
                .iter()
                .map(|event| event_offset(event.start, minutes_before))
                .filter(|instant| *instant > now)
                .min();

            let changed = entry.trigger.next_run_at != next;
            entry.trigger.next_run_at = next;
            entry.arm = if next.is_some() {
                ArmState::Armed
            } else {
                ArmState::Idle
            };

            if changed {
                entry.trigger.touch();
                if let Err(e) = self.persist(&id) {
                    warn!(trigger_id = %id, "Failed to persist event arming: {}", e);
                }
            }
        }
    }

    /// The nearest armed deadline, for the sleep-until computation.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.entries
            .values()
            .filter(|e| e.arm == ArmState::Armed)
            .filter_map(|e| e.trigger.next_run_at)
            .min()
    }

    /// Collect the due triggers at `now`, mark each Firing, and return
    /// snapshots for dispatch, ordered ascending by scheduled instant.
    ///
    /// Calling this twice at the same instant yields a firing at most once:
    /// the first call flips each due trigger to Firing and the second sees
    /// nothing armed.
    pub fn due_firings(&mut self, now: DateTime<Utc>) -> Vec<Trigger> {
        let tz = self.policy.tz;

        let mut due: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.arm == ArmState::Armed)
            .filter_map(|(id, e)| {
                e.trigger
                    .next_run_at
                    .filter(|next| *next <= now)
                    .map(|next| (next, id.clone()))
            })
            .collect();
        due.sort_by_key(|(next, _)| *next);

        let mut tickets = Vec::new();
        for (scheduled, id) in due {
            // Daily-scoped triggers fire at most once per local day
            let skip = {
                let entry = &self.entries[&id];
                entry.trigger.is_daily_scoped()
                    && self
                        .store
                        .lock()
                        .unwrap()
                        .has_completion(&id, local_date(scheduled, tz))
                        .unwrap_or(false)
            };

            if skip {
                debug!(trigger_id = %id, "Daily trigger already completed today, rolling forward");
                if let Err(e) = self.rearm_after(&id, scheduled) {
                    warn!(trigger_id = %id, "Failed to roll trigger forward: {}", e);
                }
                continue;
            }

            let entry = self.entries.get_mut(&id).expect("entry exists");
            entry.arm = ArmState::Firing;
            tickets.push(entry.trigger.clone());
        }

        tickets
    }

    /// Re-arm a trigger for its next occurrence strictly after `after`.
    fn rearm_after(&mut self, id: &str, after: DateTime<Utc>) -> Result<()> {
        self.arm(id, after)
    }

    /// Record a firing's outcome and advance the trigger's state machine.
    ///
    /// Failures leave the trigger scheduled for its next occurrence; only
    /// the configured failure threshold can expire it.
    pub fn complete_firing(
        &mut self,
        trigger_id: &str,
        outcome: std::result::Result<TaskResult, RunnerError>,
        now: DateTime<Utc>,
    ) -> Result<TaskResult> {
        let tz = self.policy.tz;
        let threshold = self.policy.failure_threshold;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => TaskResult::failure(trigger_id, &e.to_string()),
        };
        let succeeded = result.status == crate::domain::ResultStatus::Success;

        self.store.lock().unwrap().save_result(&result)?;

        let Some(entry) = self.entries.get_mut(trigger_id) else {
            // Deleted while firing; the result is recorded, nothing to advance
            warn!(trigger_id = %trigger_id, "Completion for unknown trigger");
            return Ok(result);
        };

        entry.trigger.run_count += 1;
        entry.trigger.last_run_at = Some(now);
        entry.arm = ArmState::Idle;

        if succeeded {
            entry.trigger.consecutive_failures = 0;
            if let Err(e) = self
                .store
                .lock()
                .unwrap()
                .record_completion(trigger_id, local_date(now, tz))
            {
                warn!(trigger_id = %trigger_id, "Failed to record completion key: {}", e);
            }
        } else {
            entry.trigger.consecutive_failures += 1;
        }

        match entry.trigger.kind {
            TriggerKind::Time => {
                entry.trigger.status = TriggerStatus::Completed;
                entry.trigger.next_run_at = None;
            }
            TriggerKind::Manual => {
                entry.trigger.next_run_at = None;
            }
            _ => {
                if let Some(threshold) = threshold {
                    if entry.trigger.consecutive_failures >= threshold {
                        warn!(
                            trigger_id = %trigger_id,
                            failures = entry.trigger.consecutive_failures,
                            "Failure threshold reached, expiring trigger"
                        );
                        entry.trigger.status = TriggerStatus::Expired;
                        entry.trigger.next_run_at = None;
                    }
                }
            }
        }

        entry.trigger.touch();
        self.arm(trigger_id, now)?;
        Ok(result)
    }

    /// Manual override: fire a trigger outside its schedule.
    ///
    /// With `force = false` a trigger that already completed today is a
    /// no-op. `force = true` bypasses the daily key but never the in-flight
    /// flag. Returns the snapshot to dispatch, or None when skipped.
    pub fn run_job_now(
        &mut self,
        trigger_id: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Trigger>> {
        let tz = self.policy.tz;
        let entry = self
            .entries
            .get_mut(trigger_id)
            .ok_or_else(|| RemindrError::TriggerNotFound(trigger_id.to_string()))?;

        if entry.arm == ArmState::Firing {
            debug!(trigger_id = %trigger_id, "Run-now skipped, already firing");
            return Ok(None);
        }

        if entry.trigger.status.is_terminal() || entry.trigger.status == TriggerStatus::Paused {
            return Err(RemindrError::InvalidState(format!(
                "trigger {} is {}",
                trigger_id,
                entry.trigger.status.as_str()
            )));
        }

        if !force {
            let completed_today = self
                .store
                .lock()
                .unwrap()
                .has_completion(trigger_id, local_date(now, tz))
                .unwrap_or(false);
            if completed_today {
                debug!(trigger_id = %trigger_id, "Run-now skipped, already completed today");
                return Ok(None);
            }
        }

        let entry = self.entries.get_mut(trigger_id).expect("entry exists");
        entry.arm = ArmState::Firing;
        Ok(Some(entry.trigger.clone()))
    }

    /// Pause a trigger; it never fires while paused.
    pub fn pause(&mut self, trigger_id: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(trigger_id)
            .ok_or_else(|| RemindrError::TriggerNotFound(trigger_id.to_string()))?;

        if entry.trigger.status.is_terminal() {
            return Err(RemindrError::InvalidState(format!(
                "cannot pause {} trigger",
                entry.trigger.status.as_str()
            )));
        }

        entry.trigger.status = TriggerStatus::Paused;
        entry.trigger.next_run_at = None;
        entry.trigger.touch();
        if entry.arm != ArmState::Firing {
            entry.arm = ArmState::Idle;
        }
        self.persist(trigger_id)
    }

    /// Resume a paused trigger and re-arm it.
    pub fn resume(&mut self, trigger_id: &str, now: DateTime<Utc>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(trigger_id)
            .ok_or_else(|| RemindrError::TriggerNotFound(trigger_id.to_string()))?;

        if entry.trigger.status != TriggerStatus::Paused {
            return Err(RemindrError::InvalidState(format!(
                "trigger {} is not paused",
                trigger_id
            )));
        }

        entry.trigger.status = TriggerStatus::Active;
        entry.trigger.touch();
        self.arm(trigger_id, now)
    }

    /// Delete a trigger from the table and the store.
    pub fn delete(&mut self, trigger_id: &str) -> Result<()> {
        if self.entries.remove(trigger_id).is_none() {
            return Err(RemindrError::TriggerNotFound(trigger_id.to_string()));
        }
        self.store.lock().unwrap().delete_trigger(trigger_id)
    }

    /// Snapshot of all triggers, for projections and listings.
    pub fn triggers(&self) -> Vec<Trigger> {
        self.entries.values().map(|e| e.trigger.clone()).collect()
    }

    /// A single trigger snapshot.
    pub fn get(&self, trigger_id: &str) -> Option<Trigger> {
        self.entries.get(trigger_id).map(|e| e.trigger.clone())
    }

    /// Runtime arming state of a trigger.
    pub fn arm_state(&self, trigger_id: &str) -> Option<ArmState> {
        self.entries.get(trigger_id).map(|e| e.arm)
    }

    /// The timezone this core schedules in.
    pub fn timezone(&self) -> Tz {
        self.policy.tz
    }

    /// Whether the trigger has a completion recorded for today.
    pub fn completed_today(&self, trigger_id: &str, now: DateTime<Utc>) -> bool {
        self.store
            .lock()
            .unwrap()
            .has_completion(trigger_id, local_date(now, self.policy.tz))
            .unwrap_or(false)
    }
}
