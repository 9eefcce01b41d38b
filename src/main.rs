use chrono::Utc;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use remindr::cli::Cli;
use remindr::cli::commands::{
    Commands, DaemonCommands, parse_instant, parse_time_of_day, parse_weekdays,
};
use remindr::config::Config;
use remindr::domain::{ResultStatus, Trigger, TriggerStatus};
use remindr::meetings::{JsonCalendarSource, MeetingWarningGenerator};
use remindr::notify::{GatewayConfig, GatewayEvent, LogPlatform, NotificationGateway};
use remindr::projection;
use remindr::runner::{AgentRunnerConfig, HttpAgentRunner, RunnerError, TaskRunner};
use remindr::scheduler::{CorePolicy, SchedulerCore, SchedulerService, ServiceConfig};
use remindr::store::TriggerStore;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remindr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("remindr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => run_daemon(config).await,
            DaemonCommands::Status => handle_daemon_status(config),
        },
        Commands::Add {
            name,
            prompt,
            at,
            weekly,
            time,
            checkin,
            lead,
        } => handle_add_command(
            name,
            prompt,
            at.as_deref(),
            weekly.as_deref(),
            time.as_deref(),
            checkin.as_deref(),
            *lead,
            config,
        ),
        Commands::List { status } => handle_list_command(status.as_deref(), config),
        Commands::Status { id } => handle_status_command(id.as_deref(), config),
        Commands::Run { id, force } => handle_run_command(id, *force, config).await,
        Commands::Pause { id } => handle_pause_command(id, config),
        Commands::Resume { id } => handle_resume_command(id, config),
        Commands::Delete { id } => handle_delete_command(id, config),
    }
}

/// Open the store and reconstruct the scheduler core from it.
fn open_core(config: &Config) -> Result<(SchedulerCore, Arc<Mutex<TriggerStore>>)> {
    let store = Arc::new(Mutex::new(TriggerStore::open_at(&config.storage.data_dir)?));
    let policy = CorePolicy {
        tz: config.tz(),
        failure_threshold: config.scheduler.failure_threshold,
    };
    let core = SchedulerCore::load(store.clone(), policy, Utc::now())?;
    Ok((core, store))
}

fn pidfile_path(config: &Config) -> PathBuf {
    config.storage.data_dir.join("remindr.pid")
}

/// Run the scheduler daemon in the foreground until ctrl-c.
async fn run_daemon(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.storage.data_dir).context("Failed to create data directory")?;
    let pidfile = pidfile_path(config);
    fs::write(&pidfile, std::process::id().to_string()).context("Failed to write pidfile")?;

    let (core, store) = open_core(config)?;

    let runner: Arc<dyn TaskRunner> = Arc::new(HttpAgentRunner::new(AgentRunnerConfig {
        endpoint: config.runner.endpoint.clone(),
        timeout: Duration::from_millis(config.runner.timeout_ms),
    })?);

    let gateway = Arc::new(NotificationGateway::new(
        Arc::new(LogPlatform::new()),
        store.clone(),
        GatewayConfig {
            snooze_delay: Duration::from_secs(config.notifications.snooze_delay_secs),
            max_snooze_count: config.notifications.max_snooze_count,
        },
    ));

    let calendar_path = config
        .meetings
        .calendar_path
        .clone()
        .unwrap_or_else(|| config.storage.data_dir.join("events.json"));
    let calendar = Arc::new(JsonCalendarSource::new(calendar_path));

    let warnings =
        MeetingWarningGenerator::new(config.meetings.lead_times_minutes.clone(), config.tz());

    let service = SchedulerService::new(
        core,
        store,
        runner,
        gateway.clone(),
        calendar,
        warnings,
        ServiceConfig {
            fallback_tick: Duration::from_secs(config.scheduler.fallback_tick_secs),
            runner_timeout: Duration::from_millis(config.runner.timeout_ms),
        },
    );

    // Log respond actions; a host embedding the engine surfaces its UI here
    let mut events = gateway.subscribe();
    tokio::spawn(async move {
        while let Ok(GatewayEvent::Respond { alert_id, context }) = events.recv().await {
            info!("Respond action on {}: {}", alert_id, context);
        }
    });

    let handle = service.start();
    println!("{}", "Scheduler daemon running (ctrl-c to stop)".cyan());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    handle.shutdown().await;
    let _ = fs::remove_file(&pidfile);
    println!("{}", "Stopped".cyan());
    Ok(())
}

fn handle_daemon_status(config: &Config) -> Result<()> {
    let pidfile = pidfile_path(config);
    match fs::read_to_string(&pidfile) {
        Ok(pid) => println!("{} (pid {})", "Daemon running".green(), pid.trim()),
        Err(_) => println!("{}", "Daemon not running".yellow()),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_add_command(
    name: &str,
    prompt: &str,
    at: Option<&str>,
    weekly: Option<&str>,
    time: Option<&str>,
    checkin: Option<&str>,
    lead: Option<i64>,
    config: &Config,
) -> Result<()> {
    let trigger = if let Some(at) = at {
        Trigger::new_one_shot(name, prompt, parse_instant(at)?)
    } else if let Some(days) = weekly {
        let time = time.ok_or_else(|| eyre::eyre!("--weekly requires --time"))?;
        Trigger::new_weekly(name, prompt, parse_weekdays(days)?, parse_time_of_day(time)?)
    } else if let Some(checkin) = checkin {
        Trigger::new_checkin(name, prompt, parse_time_of_day(checkin)?)
    } else if let Some(lead) = lead {
        Trigger::new_event(name, prompt, lead)
    } else {
        Trigger::new_manual(name, prompt)
    };

    let (mut core, _store) = open_core(config)?;
    let id = trigger.id.clone();
    core.register(trigger, Utc::now())?;

    if let Some(registered) = core.get(&id) {
        println!("{} {} ({})", "Registered:".green(), registered.name, id);
        if let Some(next) = registered.next_run_at {
            println!("  next run: {}", next.with_timezone(&config.tz()));
        }
    }
    Ok(())
}

fn handle_list_command(status: Option<&str>, config: &Config) -> Result<()> {
    let (core, _store) = open_core(config)?;

    let mut triggers = core.triggers();
    triggers.sort_by_key(|t| t.created_at);

    if let Some(filter) = status {
        triggers.retain(|t| t.status.as_str() == filter);
    }

    if triggers.is_empty() {
        println!("{}", "No triggers".yellow());
        return Ok(());
    }

    for trigger in triggers {
        let status = match trigger.status {
            TriggerStatus::Active => trigger.status.as_str().green(),
            TriggerStatus::Paused => trigger.status.as_str().yellow(),
            TriggerStatus::Expired => trigger.status.as_str().red(),
            TriggerStatus::Completed => trigger.status.as_str().normal(),
        };
        let next = trigger
            .next_run_at
            .map(|at| at.with_timezone(&config.tz()).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:10}  {:9}  next: {}  {}",
            trigger.id,
            trigger.kind.as_str(),
            status,
            next,
            trigger.name
        );
    }
    Ok(())
}

fn handle_status_command(id: Option<&str>, config: &Config) -> Result<()> {
    let (core, store) = open_core(config)?;

    let Some(id) = id else {
        // Scheduler snapshot
        let state = projection::project(&core, vec![], false, Utc::now());
        match &state.next_event {
            Some(next) => println!(
                "{} {} at {}",
                "Next:".green(),
                next.name,
                next.at.with_timezone(&config.tz())
            ),
            None => println!("{}", "Nothing scheduled".yellow()),
        }
        println!("Today's jobs:");
        for job in &state.todays_jobs {
            let marker = if job.is_completed {
                "done".green()
            } else {
                "pending".yellow()
            };
            println!("  [{}] {} ({})", marker, job.name, job.id);
        }
        return Ok(());
    };

    let trigger = core
        .get(id)
        .ok_or_else(|| eyre::eyre!("Trigger not found: {}", id))?;

    println!("{} {} ({})", "Trigger:".green(), trigger.name, trigger.id);
    println!("  kind: {}", trigger.kind.as_str());
    println!("  status: {}", trigger.status.as_str());
    println!("  runs: {}", trigger.run_count);
    if let Some(next) = trigger.next_run_at {
        println!("  next run: {}", next.with_timezone(&config.tz()));
    }
    if let Some(last) = trigger.last_run_at {
        println!("  last run: {}", last.with_timezone(&config.tz()));
    }

    let results = store.lock().unwrap().list_results(id, 5)?;
    if !results.is_empty() {
        println!("Recent results:");
        for result in results {
            let marker = match result.status {
                ResultStatus::Success => "✓".green(),
                ResultStatus::Failed => "✗".red(),
                ResultStatus::Pending => "…".yellow(),
            };
            println!("  {} {}", marker, result.truncated_output(80));
        }
    }
    Ok(())
}

async fn handle_run_command(id: &str, force: bool, config: &Config) -> Result<()> {
    let (mut core, _store) = open_core(config)?;

    let Some(ticket) = core.run_job_now(id, force, Utc::now())? else {
        println!(
            "{}",
            "Skipped: already completed today (use --force to run anyway)".yellow()
        );
        return Ok(());
    };

    println!("{} {}", "Running:".cyan(), ticket.name);

    let window = Duration::from_millis(config.runner.timeout_ms);
    let runner = HttpAgentRunner::new(AgentRunnerConfig {
        endpoint: config.runner.endpoint.clone(),
        timeout: window,
    })?;

    let outcome = match tokio::time::timeout(window, runner.run(&ticket)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(RunnerError::Timeout(window)),
    };

    let result = core.complete_firing(id, outcome, Utc::now())?;
    match result.status {
        ResultStatus::Success => {
            println!("{} {}", "✓".green(), result.truncated_output(200));
        }
        _ => {
            println!("{} {}", "✗".red(), result.truncated_output(200));
        }
    }
    Ok(())
}

fn handle_pause_command(id: &str, config: &Config) -> Result<()> {
    let (mut core, _store) = open_core(config)?;
    core.pause(id)?;
    println!("{} {}", "Paused:".yellow(), id);
    Ok(())
}

fn handle_resume_command(id: &str, config: &Config) -> Result<()> {
    let (mut core, _store) = open_core(config)?;
    core.resume(id, Utc::now())?;
    println!("{} {}", "Resumed:".green(), id);
    Ok(())
}

fn handle_delete_command(id: &str, config: &Config) -> Result<()> {
    let (mut core, _store) = open_core(config)?;
    core.delete(id)?;
    println!("{} {}", "Deleted:".red(), id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config)
        .await
        .context("Application failed")?;

    Ok(())
}
