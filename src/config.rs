use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    /// IANA timezone name used for all local wall-clock computation
    pub timezone: String,
    pub scheduler: SchedulerConfig,
    pub runner: RunnerConfig,
    pub notifications: NotificationConfig,
    pub meetings: MeetingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fallback tick interval absorbing sleep/wake and clock changes
    pub fallback_tick_secs: u64,
    /// Consecutive failures before a recurring trigger is expired.
    /// None means failures never disable a trigger.
    pub failure_threshold: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fallback_tick_secs: 60,
            failure_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Endpoint of the local agent execution service
    pub endpoint: String,
    /// Bounded execution window per runner call
    pub timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8675/v1/runs".to_string(),
            timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Delay before a snoozed alert is re-queued
    pub snooze_delay_secs: u64,
    /// Snoozes allowed per alert before further snoozes dismiss instead
    pub max_snooze_count: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            snooze_delay_secs: 15 * 60,
            max_snooze_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingConfig {
    /// Lead times in minutes before an event start that produce a warning
    pub lead_times_minutes: Vec<i64>,
    /// Path to an exported calendar events JSON file
    pub calendar_path: Option<PathBuf>,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            lead_times_minutes: vec![15],
            calendar_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("remindr"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            timezone: "UTC".to_string(),
            scheduler: SchedulerConfig::default(),
            runner: RunnerConfig::default(),
            notifications: NotificationConfig::default(),
            meetings: MeetingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir
                .join(project_name)
                .join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!(
                            "Failed to load config from {}: {}",
                            primary_config.display(),
                            e
                        );
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!(
                        "Failed to load config from {}: {}",
                        fallback_config.display(),
                        e
                    );
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse the configured timezone, falling back to UTC on a bad name
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            log::warn!("Unknown timezone '{}', falling back to UTC", self.timezone);
            chrono_tz::Tz::UTC
        })
    }
}
