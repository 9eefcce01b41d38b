//! Scheduler service - the async loop driving the core.
//!
//! One logical loop: sleep until the nearest deadline (bounded by a periodic
//! fallback tick that absorbs sleep/wake and clock changes), wake, fire due
//! triggers as independent tasks, refresh meeting warnings, and drain snooze
//! requeues. Commands arrive over a channel; a cloneable handle is the only
//! way in.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::domain::{Alert, AlertCategory, MeetingWarning, ResultStatus, Trigger, TriggerKind};
use crate::error::{RemindrError, Result};
use crate::meetings::{CalendarSource, MeetingWarningGenerator};
use crate::notify::NotificationGateway;
use crate::projection::{self, SchedulerState};
use crate::runner::{RunnerError, TaskRunner};
use crate::scheduler::core::SchedulerCore;
use crate::store::TriggerStore;

/// Commands the handle can send to the service loop
pub enum SchedulerCommand {
    Register(Box<Trigger>, oneshot::Sender<Result<()>>),
    RunNow {
        id: String,
        force: bool,
        reply: oneshot::Sender<Result<bool>>,
    },
    Pause {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    GetState(oneshot::Sender<SchedulerState>),
    Shutdown,
}

/// Handle for interacting with a running scheduler service.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Register a new trigger.
    pub async fn register(&self, trigger: Trigger) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Register(Box::new(trigger), tx))
            .await?;
        rx.await
            .map_err(|_| RemindrError::InvalidState("scheduler stopped".to_string()))?
    }

    /// Fire a trigger from a presentation surface, honoring the daily
    /// idempotence key. Equivalent to `run_now(id, false)`.
    pub async fn trigger_task(&self, id: &str) -> Result<bool> {
        self.run_now(id, false).await
    }

    /// Fire a trigger now. Returns false when skipped (already completed
    /// today without force, or already firing).
    pub async fn run_now(&self, id: &str, force: bool) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::RunNow {
            id: id.to_string(),
            force,
            reply: tx,
        })
        .await?;
        rx.await
            .map_err(|_| RemindrError::InvalidState("scheduler stopped".to_string()))?
    }

    /// Pause a trigger.
    pub async fn pause(&self, id: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Pause {
            id: id.to_string(),
            reply: tx,
        })
        .await?;
        rx.await
            .map_err(|_| RemindrError::InvalidState("scheduler stopped".to_string()))?
    }

    /// Resume a paused trigger.
    pub async fn resume(&self, id: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Resume {
            id: id.to_string(),
            reply: tx,
        })
        .await?;
        rx.await
            .map_err(|_| RemindrError::InvalidState("scheduler stopped".to_string()))?
    }

    /// Delete a trigger.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Delete {
            id: id.to_string(),
            reply: tx,
        })
        .await?;
        rx.await
            .map_err(|_| RemindrError::InvalidState("scheduler stopped".to_string()))?
    }

    /// Read-only snapshot for presentation layers.
    pub async fn state(&self) -> Result<SchedulerState> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::GetState(tx)).await?;
        rx.await
            .map_err(|_| RemindrError::InvalidState("scheduler stopped".to_string()))
    }

    /// Stop the service loop.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;
    }

    async fn send(&self, cmd: SchedulerCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| RemindrError::InvalidState("scheduler stopped".to_string()))
    }
}

/// A delivered meeting warning still awaiting its event
struct ActiveWarning {
    alert_id: String,
    warning: MeetingWarning,
}

/// Tuning for the service loop
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound on any sleep; absorbs clock changes
    pub fallback_tick: Duration,
    /// Bounded execution window per runner call
    pub runner_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fallback_tick: Duration::from_secs(60),
            runner_timeout: Duration::from_secs(120),
        }
    }
}

/// The scheduler service owning the core and its collaborators.
pub struct SchedulerService {
    core: Arc<Mutex<SchedulerCore>>,
    store: Arc<Mutex<TriggerStore>>,
    runner: Arc<dyn TaskRunner>,
    gateway: Arc<NotificationGateway>,
    calendar: Arc<dyn CalendarSource>,
    warnings: MeetingWarningGenerator,
    config: ServiceConfig,
    active_warnings: Mutex<Vec<ActiveWarning>>,
}

impl SchedulerService {
    /// Assemble the service from its parts.
    pub fn new(
        core: SchedulerCore,
        store: Arc<Mutex<TriggerStore>>,
        runner: Arc<dyn TaskRunner>,
        gateway: Arc<NotificationGateway>,
        calendar: Arc<dyn CalendarSource>,
        warnings: MeetingWarningGenerator,
        config: ServiceConfig,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(core)),
            store,
            runner,
            gateway,
            calendar,
            warnings,
            config,
            active_warnings: Mutex::new(Vec::new()),
        }
    }

    /// Start the service loop and return its handle.
    pub fn start(self) -> SchedulerHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        let handle = SchedulerHandle { command_tx };
        tokio::spawn(self.run(command_rx));
        handle
    }

    /// Main service loop.
    async fn run(self, mut command_rx: mpsc::Receiver<SchedulerCommand>) {
        info!("Scheduler service started");
        self.gateway.ensure_authorized().await;

        loop {
            self.tick(Utc::now()).await;

            let sleep_for = self.next_wakeup(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                cmd = command_rx.recv() => {
                    match cmd {
                        None | Some(SchedulerCommand::Shutdown) => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
            }
        }

        info!("Scheduler service stopped");
    }

    /// How long to sleep: until the nearest trigger deadline or snooze
    /// requeue, bounded by the fallback tick.
    fn next_wakeup(&self, now: DateTime<Utc>) -> Duration {
        let next_trigger = self.core.lock().unwrap().next_deadline();
        let next_requeue = self.gateway.next_requeue_at();

        let deadline = match (next_trigger, next_requeue) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        match deadline {
            Some(deadline) => {
                let until = (deadline - now).to_std().unwrap_or(Duration::ZERO);
                until.min(self.config.fallback_tick)
            }
            None => self.config.fallback_tick,
        }
    }

    /// One evaluation pass at `now`.
    async fn tick(&self, now: DateTime<Utc>) {
        // Fresh calendar pull: arms event triggers and feeds warnings
        let events = self.calendar.todays_events();
        self.core.lock().unwrap().resolve_events(&events, now);

        let warnings = {
            let mut store = self.store.lock().unwrap();
            self.warnings.refresh(&events, now, &mut store)
        };
        for warning in warnings {
            let alert = warning.to_alert();
            self.active_warnings.lock().unwrap().push(ActiveWarning {
                alert_id: alert.id.clone(),
                warning,
            });
            self.gateway.deliver(alert).await;
        }

        // Warnings for meetings that have started are no longer actionable
        let stale: Vec<String> = {
            let mut active = self.active_warnings.lock().unwrap();
            let (started, pending): (Vec<_>, Vec<_>) = active
                .drain(..)
                .partition(|a| a.warning.event_time <= now);
            *active = pending;
            started.into_iter().map(|a| a.alert_id).collect()
        };
        for alert_id in stale {
            self.gateway.expire(&alert_id);
        }

        // Re-deliver snoozed alerts whose delay elapsed
        self.gateway.due_requeues(now).await;

        // Fire everything due, each as an independent unit of work
        let due = self.core.lock().unwrap().due_firings(now);
        for trigger in due {
            self.spawn_firing(trigger);
        }
    }

    /// Dispatch one firing without blocking the loop or other firings.
    fn spawn_firing(&self, trigger: Trigger) {
        let core = self.core.clone();
        let runner = self.runner.clone();
        let gateway = self.gateway.clone();
        let window = self.config.runner_timeout;

        tokio::spawn(async move {
            let trigger_id = trigger.id.clone();
            info!(trigger_id = %trigger_id, name = %trigger.name, "Firing trigger");

            let outcome = match timeout(window, runner.run(&trigger)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RunnerError::Timeout(window)),
            };

            let completed = {
                let mut core = core.lock().unwrap();
                core.complete_firing(&trigger_id, outcome, Utc::now())
            };

            match completed {
                Ok(result) if result.status == ResultStatus::Success => {
                    let category = match trigger.kind {
                        TriggerKind::Checkin => AlertCategory::Reminder,
                        _ => AlertCategory::Briefing,
                    };
                    let alert =
                        Alert::new(&trigger.name, &result.truncated_output(240), category);
                    gateway.deliver(alert).await;
                }
                Ok(result) => {
                    warn!(
                        trigger_id = %trigger_id,
                        output = %result.truncated_output(120),
                        "Trigger firing failed"
                    );
                }
                Err(e) => {
                    error!(trigger_id = %trigger_id, "Failed to record firing outcome: {}", e);
                }
            }
        });
    }

    /// Apply a handle command against the core.
    async fn handle_command(&self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Register(trigger, reply) => {
                let result = self.core.lock().unwrap().register(*trigger, Utc::now());
                let _ = reply.send(result);
            }
            SchedulerCommand::RunNow { id, force, reply } => {
                let ticket = self.core.lock().unwrap().run_job_now(&id, force, Utc::now());
                let result = match ticket {
                    Ok(Some(trigger)) => {
                        self.spawn_firing(trigger);
                        Ok(true)
                    }
                    Ok(None) => Ok(false),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SchedulerCommand::Pause { id, reply } => {
                let _ = reply.send(self.core.lock().unwrap().pause(&id));
            }
            SchedulerCommand::Resume { id, reply } => {
                let _ = reply.send(self.core.lock().unwrap().resume(&id, Utc::now()));
            }
            SchedulerCommand::Delete { id, reply } => {
                let _ = reply.send(self.core.lock().unwrap().delete(&id));
            }
            SchedulerCommand::GetState(reply) => {
                let warnings: Vec<MeetingWarning> = self
                    .active_warnings
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|a| a.warning.clone())
                    .collect();
                let state = {
                    let core = self.core.lock().unwrap();
                    projection::project(
                        &core,
                        warnings,
                        self.gateway.delivery_degraded(),
                        Utc::now(),
                    )
                };
                let _ = reply.send(state);
            }
            SchedulerCommand::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeOfDay;
    use crate::meetings::MockCalendar;
    use crate::notify::{GatewayConfig, MockPlatform};
    use crate::runner::MockRunner;
    use crate::scheduler::core::CorePolicy;
    use tempfile::TempDir;

    struct Fixture {
        handle: SchedulerHandle,
        runner: Arc<MockRunner>,
        platform: Arc<MockPlatform>,
        calendar: Arc<MockCalendar>,
        _temp: TempDir,
    }

    fn build(config: ServiceConfig) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(Mutex::new(TriggerStore::open_at(temp.path()).unwrap()));
        let core =
            SchedulerCore::load(store.clone(), CorePolicy::default(), Utc::now()).unwrap();
        let runner = Arc::new(MockRunner::new());
        let platform = Arc::new(MockPlatform::new());
        let calendar = Arc::new(MockCalendar::new());
        let gateway = Arc::new(NotificationGateway::new(
            platform.clone(),
            store.clone(),
            GatewayConfig::default(),
        ));
        let warnings = MeetingWarningGenerator::new(vec![15], chrono_tz::Tz::UTC);

        let service = SchedulerService::new(
            core,
            store,
            runner.clone(),
            gateway,
            calendar.clone(),
            warnings,
            config,
        );
        let handle = service.start();

        Fixture {
            handle,
            runner,
            platform,
            calendar,
            _temp: temp,
        }
    }

    fn fast_config() -> ServiceConfig {
        ServiceConfig {
            fallback_tick: Duration::from_millis(20),
            runner_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_run_now_executes_and_notifies() {
        let fixture = build(fast_config());
        let trigger = Trigger::new_manual("Report", "run the report");
        let id = trigger.id.clone();
        fixture.handle.register(trigger).await.unwrap();

        assert!(fixture.handle.run_now(&id, false).await.unwrap());

        // Let the spawned firing and delivery settle
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fixture.runner.call_count(&id), 1);
        assert_eq!(fixture.platform.sent_count(), 1);
        assert_eq!(fixture.platform.sent()[0].title, "Report");

        // Second run-now without force: skipped, nothing new
        assert!(!fixture.handle.run_now(&id, false).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fixture.runner.call_count(&id), 1);

        fixture.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_register_rejects_bad_spec_over_handle() {
        let fixture = build(fast_config());
        let bad = Trigger::new_weekly("Bad", "x", vec![], TimeOfDay::new(9, 0));

        let err = fixture.handle.register(bad).await.unwrap_err();
        assert!(matches!(err, RemindrError::ScheduleParse(_)));

        fixture.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_due_trigger_fires_via_fallback_tick() {
        let fixture = build(fast_config());
        let trigger =
            Trigger::new_one_shot("Soon", "go", Utc::now() + chrono::Duration::milliseconds(30));
        let id = trigger.id.clone();
        fixture.handle.register(trigger).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fixture.runner.call_count(&id), 1);

        // One-shot: no second firing on later ticks
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fixture.runner.call_count(&id), 1);

        fixture.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_runner_timeout_recorded_and_other_trigger_unaffected() {
        let fixture = build(ServiceConfig {
            fallback_tick: Duration::from_millis(20),
            runner_timeout: Duration::from_millis(50),
        });

        let slow = Trigger::new_manual("Slow", "s");
        let fast = Trigger::new_manual("Fast", "f");
        let (slow_id, fast_id) = (slow.id.clone(), fast.id.clone());
        fixture.runner.delay_trigger(&slow_id, Duration::from_secs(5));

        fixture.handle.register(slow).await.unwrap();
        fixture.handle.register(fast).await.unwrap();

        assert!(fixture.handle.run_now(&slow_id, true).await.unwrap());
        assert!(fixture.handle.run_now(&fast_id, true).await.unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;

        // The fast trigger succeeded and produced its notification
        assert_eq!(fixture.runner.call_count(&fast_id), 1);
        let titles: Vec<String> = fixture.platform.sent().iter().map(|r| r.title.clone()).collect();
        assert!(titles.contains(&"Fast".to_string()));
        // The slow one timed out: no success notification for it
        assert!(!titles.contains(&"Slow".to_string()));

        fixture.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_meeting_warning_delivered_once() {
        let fixture = build(fast_config());
        let start = Utc::now() + chrono::Duration::minutes(10);
        fixture.calendar.set_events(vec![crate::domain::CalendarEvent {
            id: "evt-1".to_string(),
            title: "Design review".to_string(),
            start,
            end: start + chrono::Duration::hours(1),
        }]);

        // Inside the 15-minute lead window already; several ticks pass
        tokio::time::sleep(Duration::from_millis(150)).await;

        let meeting_sends = fixture
            .platform
            .sent()
            .iter()
            .filter(|r| r.title == "Design review")
            .count();
        assert_eq!(meeting_sends, 1);

        let state = fixture.handle.state().await.unwrap();
        assert_eq!(state.meeting_warnings.len(), 1);
        assert_eq!(state.meeting_warnings[0].event_id, "evt-1");

        fixture.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_snapshot_reflects_jobs() {
        let fixture = build(fast_config());
        let trigger = Trigger::new_one_shot(
            "Tonight",
            "evening task",
            Utc::now() + chrono::Duration::minutes(1),
        );
        let id = trigger.id.clone();
        fixture.handle.register(trigger).await.unwrap();

        let state = fixture.handle.state().await.unwrap();
        let next = state.next_event.expect("next event");
        assert_eq!(next.trigger_id, id);
        assert_eq!(state.todays_jobs.len(), 1);
        assert!(!state.todays_jobs[0].is_completed);
        assert!(!state.delivery_degraded);

        fixture.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_delivery_degraded_surfaces_in_state() {
        let fixture = build(fast_config());
        fixture.platform.revoke();

        let trigger = Trigger::new_manual("Report", "r");
        let id = trigger.id.clone();
        fixture.handle.register(trigger).await.unwrap();
        fixture.handle.run_now(&id, true).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let state = fixture.handle.state().await.unwrap();
        assert!(state.delivery_degraded);

        fixture.handle.shutdown().await;
    }
}
