//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - daemon: start/status for the scheduler daemon
//! - add: register a trigger
//! - list/status: inspect triggers and results
//! - run/pause/resume/delete: trigger operations

use chrono::{DateTime, Utc, Weekday};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::TimeOfDay;
use crate::error::{RemindrError, Result};

/// Remindr - a local task and notification scheduling daemon
#[derive(Parser, Debug)]
#[command(name = "remindr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Daemon management commands
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Register a new trigger
    Add {
        /// Trigger name
        name: String,

        /// Work prompt handed to the runner when the trigger fires
        #[arg(short, long)]
        prompt: String,

        /// One-shot firing instant (RFC 3339, e.g. 2024-06-03T09:00:00Z)
        #[arg(long, conflicts_with_all = ["weekly", "checkin", "lead"])]
        at: Option<String>,

        /// Weekly weekdays, comma separated (e.g. mon,wed,fri)
        #[arg(long, requires = "time", conflicts_with_all = ["checkin", "lead"])]
        weekly: Option<String>,

        /// Local time of day for --weekly (HH:MM)
        #[arg(long)]
        time: Option<String>,

        /// Daily check-in local time (HH:MM)
        #[arg(long, conflicts_with = "lead")]
        checkin: Option<String>,

        /// Fire this many minutes before each calendar event
        #[arg(long)]
        lead: Option<i64>,
    },

    /// List all triggers
    List {
        /// Filter by status (active, paused, completed, expired)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show scheduler state, or one trigger's detail
    Status {
        /// Trigger ID to inspect (omit for the scheduler snapshot)
        id: Option<String>,
    },

    /// Fire a trigger now
    Run {
        /// Trigger ID to fire
        id: String,

        /// Execute even if the trigger already completed today
        #[arg(short, long)]
        force: bool,
    },

    /// Pause a trigger
    Pause {
        /// Trigger ID to pause
        id: String,
    },

    /// Resume a paused trigger
    Resume {
        /// Trigger ID to resume
        id: String,
    },

    /// Delete a trigger
    Delete {
        /// Trigger ID to delete
        id: String,
    },
}

/// Daemon management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DaemonCommands {
    /// Run the scheduler daemon in the foreground
    Start,

    /// Check whether a daemon is running
    Status,
}

/// Parse an HH:MM string into a time of day.
pub fn parse_time_of_day(input: &str) -> Result<TimeOfDay> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 2 {
        return Err(RemindrError::ScheduleParse(format!(
            "expected HH:MM, got '{}'",
            input
        )));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| RemindrError::ScheduleParse(format!("bad hour in '{}'", input)))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| RemindrError::ScheduleParse(format!("bad minute in '{}'", input)))?;

    let tod = TimeOfDay::new(hour, minute);
    if !tod.is_valid() {
        return Err(RemindrError::ScheduleParse(format!(
            "time {} out of range",
            input
        )));
    }
    Ok(tod)
}

/// Parse a comma-separated weekday list (e.g. "mon,wed,fri").
pub fn parse_weekdays(input: &str) -> Result<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in input.split(',') {
        let day = match part.trim().to_lowercase().as_str() {
            "mon" | "monday" => Weekday::Mon,
            "tue" | "tuesday" => Weekday::Tue,
            "wed" | "wednesday" => Weekday::Wed,
            "thu" | "thursday" => Weekday::Thu,
            "fri" | "friday" => Weekday::Fri,
            "sat" | "saturday" => Weekday::Sat,
            "sun" | "sunday" => Weekday::Sun,
            other => {
                return Err(RemindrError::ScheduleParse(format!(
                    "unknown weekday '{}'",
                    other
                )));
            }
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

/// Parse an RFC 3339 instant.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RemindrError::ScheduleParse(format!("bad instant '{}': {}", input, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["remindr", "-v", "list"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["remindr", "-c", "/path/to/remindr.yml", "list"]).unwrap();
        assert_eq!(
            cli.config.as_ref(),
            Some(&PathBuf::from("/path/to/remindr.yml"))
        );
    }

    #[test]
    fn test_daemon_start() {
        let cli = Cli::try_parse_from(["remindr", "daemon", "start"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Daemon {
                command: DaemonCommands::Start
            }
        ));
    }

    #[test]
    fn test_daemon_status() {
        let cli = Cli::try_parse_from(["remindr", "daemon", "status"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Daemon {
                command: DaemonCommands::Status
            }
        ));
    }

    #[test]
    fn test_add_one_shot() {
        let cli = Cli::try_parse_from([
            "remindr",
            "add",
            "Launch",
            "-p",
            "go",
            "--at",
            "2024-06-03T09:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Commands::Add {
                name, prompt, at, ..
            } => {
                assert_eq!(name, "Launch");
                assert_eq!(prompt, "go");
                assert_eq!(at.as_deref(), Some("2024-06-03T09:00:00Z"));
            }
            _ => panic!("Expected add command"),
        }
    }

    #[test]
    fn test_add_weekly_requires_time() {
        let result = Cli::try_parse_from([
            "remindr", "add", "Standup", "-p", "notes", "--weekly", "mon,wed",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_add_weekly_with_time() {
        let cli = Cli::try_parse_from([
            "remindr", "add", "Standup", "-p", "notes", "--weekly", "mon,wed", "--time", "09:00",
        ])
        .unwrap();
        match cli.command {
            Commands::Add { weekly, time, .. } => {
                assert_eq!(weekly.as_deref(), Some("mon,wed"));
                assert_eq!(time.as_deref(), Some("09:00"));
            }
            _ => panic!("Expected add command"),
        }
    }

    #[test]
    fn test_add_conflicting_schedules_rejected() {
        let result = Cli::try_parse_from([
            "remindr",
            "add",
            "Bad",
            "-p",
            "x",
            "--at",
            "2024-06-03T09:00:00Z",
            "--checkin",
            "17:00",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_with_force() {
        let cli = Cli::try_parse_from(["remindr", "run", "trig-123", "--force"]).unwrap();
        match cli.command {
            Commands::Run { id, force } => {
                assert_eq!(id, "trig-123");
                assert!(force);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_list_with_status_filter() {
        let cli = Cli::try_parse_from(["remindr", "list", "-s", "paused"]).unwrap();
        match cli.command {
            Commands::List { status } => assert_eq!(status, Some("paused".to_string())),
            _ => panic!("Expected list command"),
        }
    }

    #[test]
    fn test_status_without_id() {
        let cli = Cli::try_parse_from(["remindr", "status"]).unwrap();
        match cli.command {
            Commands::Status { id } => assert!(id.is_none()),
            _ => panic!("Expected status command"),
        }
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("09:00").unwrap(), TimeOfDay::new(9, 0));
        assert_eq!(parse_time_of_day("23:59").unwrap(), TimeOfDay::new(23, 59));
        assert!(parse_time_of_day("24:00").is_err());
        assert!(parse_time_of_day("9").is_err());
        assert!(parse_time_of_day("nine:00").is_err());
    }

    #[test]
    fn test_parse_weekdays() {
        assert_eq!(
            parse_weekdays("mon,wed,fri").unwrap(),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
        assert_eq!(parse_weekdays("Saturday").unwrap(), vec![Weekday::Sat]);
        // Duplicates collapse
        assert_eq!(parse_weekdays("mon,mon").unwrap(), vec![Weekday::Mon]);
        assert!(parse_weekdays("mon,noday").is_err());
    }

    #[test]
    fn test_parse_instant() {
        let instant = parse_instant("2024-06-03T09:00:00Z").unwrap();
        assert_eq!(instant.to_rfc3339(), "2024-06-03T09:00:00+00:00");
        assert!(parse_instant("tomorrow").is_err());
    }

    #[test]
    fn test_help_works() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
