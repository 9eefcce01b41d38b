//! Read-only scheduler state snapshot for presentation layers.
//!
//! Presentation code never touches the core directly; it gets a
//! `SchedulerState` computed under the scheduler's lock and owns the copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MeetingWarning, TriggerStatus};
use crate::recurrence::local_date;
use crate::scheduler::core::SchedulerCore;

/// The nearest upcoming firing across all armed triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextEvent {
    pub trigger_id: String,
    pub name: String,
    pub at: DateTime<Utc>,
}

/// One of today's jobs: scheduled for today or already completed today
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

/// Snapshot of the scheduler for presentation layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerState {
    pub next_event: Option<NextEvent>,
    pub todays_jobs: Vec<JobSummary>,
    pub meeting_warnings: Vec<MeetingWarning>,
    /// One-time indicator that notification delivery has degraded
    pub delivery_degraded: bool,
}

/// Build the snapshot at `now`.
pub fn project(
    core: &SchedulerCore,
    meeting_warnings: Vec<MeetingWarning>,
    delivery_degraded: bool,
    now: DateTime<Utc>,
) -> SchedulerState {
    let tz = core.timezone();
    let today = local_date(now, tz);

    let mut triggers = core.triggers();
    triggers.sort_by_key(|t| t.next_run_at);

    let next_event = triggers
        .iter()
        .filter(|t| t.status == TriggerStatus::Active)
        .filter_map(|t| t.next_run_at.map(|at| (at, t)))
        .min_by_key(|(at, _)| *at)
        .map(|(at, t)| NextEvent {
            trigger_id: t.id.clone(),
            name: t.name.clone(),
            at,
        });

    let todays_jobs = triggers
        .iter()
        .filter_map(|t| {
            let completed_today = core.completed_today(&t.id, now);
            let scheduled_today = t
                .next_run_at
                .is_some_and(|at| local_date(at, tz) == today);

            if !completed_today && !scheduled_today {
                return None;
            }

            Some(JobSummary {
                id: t.id.clone(),
                name: t.name.clone(),
                scheduled_time: t.next_run_at.or(t.last_run_at),
                is_completed: completed_today,
            })
        })
        .collect();

    SchedulerState {
        next_event,
        todays_jobs,
        meeting_warnings,
        delivery_degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TimeOfDay, Trigger};
    use crate::scheduler::core::CorePolicy;
    use crate::store::TriggerStore;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn t(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, mi, 0).unwrap()
    }

    fn setup() -> (SchedulerCore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(Mutex::new(TriggerStore::open_at(temp.path()).unwrap()));
        let core = SchedulerCore::load(store, CorePolicy::default(), t(0, 0)).unwrap();
        (core, temp)
    }

    #[test]
    fn test_empty_state() {
        let (core, _temp) = setup();
        let state = project(&core, vec![], false, t(8, 0));
        assert!(state.next_event.is_none());
        assert!(state.todays_jobs.is_empty());
        assert!(state.meeting_warnings.is_empty());
        assert!(!state.delivery_degraded);
    }

    #[test]
    fn test_next_event_is_earliest_armed() {
        let (mut core, _temp) = setup();
        let late = Trigger::new_one_shot("Late", "l", t(18, 0));
        let early = Trigger::new_one_shot("Early", "e", t(10, 0));
        let early_id = early.id.clone();
        core.register(late, t(8, 0)).unwrap();
        core.register(early, t(8, 0)).unwrap();

        let state = project(&core, vec![], false, t(8, 0));
        let next = state.next_event.unwrap();
        assert_eq!(next.trigger_id, early_id);
        assert_eq!(next.at, t(10, 0));
        assert_eq!(state.todays_jobs.len(), 2);
    }

    #[test]
    fn test_completed_job_flagged() {
        let (mut core, _temp) = setup();
        let trigger = Trigger::new_checkin("Check-in", "hi", TimeOfDay::new(9, 0));
        let id = trigger.id.clone();
        core.register(trigger, t(8, 0)).unwrap();

        core.due_firings(t(9, 0));
        core.complete_firing(
            &id,
            Ok(crate::domain::TaskResult::success(&id, "done", 0.0)),
            t(9, 0),
        )
        .unwrap();

        let state = project(&core, vec![], false, t(10, 0));
        let job = state
            .todays_jobs
            .iter()
            .find(|j| j.id == id)
            .expect("job listed");
        assert!(job.is_completed);
    }

    #[test]
    fn test_tomorrow_only_job_not_listed_today() {
        let (mut core, _temp) = setup();
        let trigger = Trigger::new_one_shot(
            "Tomorrow",
            "t",
            Utc.with_ymd_and_hms(2024, 6, 4, 9, 0, 0).unwrap(),
        );
        core.register(trigger, t(8, 0)).unwrap();

        let state = project(&core, vec![], false, t(8, 0));
        assert!(state.todays_jobs.is_empty());
        // Still the next event, just not one of today's jobs
        assert!(state.next_event.is_some());
    }

    #[test]
    fn test_warnings_and_degraded_flag_pass_through() {
        let (core, _temp) = setup();
        let warning = MeetingWarning {
            event_id: "evt-1".to_string(),
            event_title: "Review".to_string(),
            event_time: t(10, 0),
            minutes_before: 15,
        };

        let state = project(&core, vec![warning.clone()], true, t(9, 45));
        assert_eq!(state.meeting_warnings, vec![warning]);
        assert!(state.delivery_degraded);
    }

    #[test]
    fn test_state_serializes() {
        let (core, _temp) = setup();
        let state = project(&core, vec![], false, t(8, 0));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("todays_jobs"));
    }
}
