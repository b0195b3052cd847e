//! Configuration management for the backup waker.
//!
//! Loads configuration from a TOML file. The resolved target hardware address
//! is written back to the same file so it only has to be discovered once.

use crate::scheduler::ScheduleSettings;
use crate::target::{MacAddress, TargetIdentity, WakeConfig};
use crate::utils::{Result, WakerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub target: TargetConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Time between backups, in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Expected duration of one backup, in seconds
    #[serde(default = "default_backup_duration_secs")]
    pub backup_duration_secs: u64,

    /// Completion checks before a running backup is declared stuck
    #[serde(default = "default_max_completion_polls")]
    pub max_completion_polls: u32,

    /// Ask the engine for low-priority I/O
    #[serde(default = "default_low_priority")]
    pub low_priority: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Host name or IP address of the backup target
    pub host: String,

    /// Hardware address of the target; filled in automatically once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<MacAddress>,

    /// Time a woken target gets to come up, in seconds
    #[serde(default = "default_max_startup_secs")]
    pub max_startup_secs: u64,

    /// Reply deadline of a reachability probe, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// UDP destination port of the wake-on-LAN packet
    #[serde(default = "default_wake_port")]
    pub wake_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prints `<flags> <last backup time>`
    pub status_command: Vec<String>,

    pub start_command: Vec<String>,

    #[serde(default)]
    pub stop_command: Vec<String>,

    #[serde(default)]
    pub reload_command: Vec<String>,

    /// Upper bound for any single engine command, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_interval_secs() -> u64 {
    60 * 60
}

fn default_backup_duration_secs() -> u64 {
    600
}

fn default_max_completion_polls() -> u32 {
    3
}

fn default_low_priority() -> bool {
    true
}

fn default_max_startup_secs() -> u64 {
    120
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_wake_port() -> u16 {
    9
}

fn default_command_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            backup_duration_secs: default_backup_duration_secs(),
            max_completion_polls: default_max_completion_polls(),
            low_priority: default_low_priority(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            schedule: ScheduleConfig::default(),
            target: TargetConfig {
                host: String::new(),
                mac_address: None,
                max_startup_secs: default_max_startup_secs(),
                probe_timeout_ms: default_probe_timeout_ms(),
                wake_port: default_wake_port(),
            },
            engine: EngineConfig {
                status_command: Vec::new(),
                start_command: Vec::new(),
                stop_command: Vec::new(),
                reload_command: Vec::new(),
                command_timeout_secs: default_command_timeout_secs(),
            },
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration back as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.host.trim().is_empty() {
            return Err(WakerError::Config("target.host must be set".into()));
        }
        if self.engine.status_command.is_empty() {
            return Err(WakerError::Config("engine.status_command must be set".into()));
        }
        if self.engine.start_command.is_empty() {
            return Err(WakerError::Config("engine.start_command must be set".into()));
        }
        if self.schedule.max_completion_polls == 0 {
            return Err(WakerError::Config(
                "schedule.max_completion_polls must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn schedule_settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            interval: Duration::from_secs(self.schedule.interval_secs),
            backup_duration_estimate: Duration::from_secs(self.schedule.backup_duration_secs),
            max_completion_polls: self.schedule.max_completion_polls,
            low_priority: self.schedule.low_priority,
        }
    }

    pub fn wake_config(&self) -> WakeConfig {
        WakeConfig {
            max_startup_wait: Duration::from_secs(self.target.max_startup_secs),
            probe_timeout: Duration::from_millis(self.target.probe_timeout_ms),
            wake_port: self.target.wake_port,
        }
    }

    pub fn target_identity(&self) -> TargetIdentity {
        TargetIdentity::new(self.target.host.clone(), self.target.mac_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[target]
host = "nas.local"

[engine]
status_command = ["backupctl", "status"]
start_command = ["backupctl", "start"]
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.target.max_startup_secs, 120);
        assert_eq!(config.target.mac_address, None);
        assert_eq!(config.engine.command_timeout_secs, 60);
        assert_eq!(config.log.level, "info");

        let settings = config.schedule_settings();
        assert_eq!(settings.max_completion_polls, 3);
        assert_eq!(settings.backup_duration_estimate, Duration::from_secs(600));
    }

    #[test]
    fn test_save_persists_resolved_mac() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("backup-waker.toml");
        std::fs::write(&path, MINIMAL)?;

        let mut config = Config::from_file(&path)?;
        config.target.mac_address = Some("aa-bb-cc-dd-ee-ff".parse()?);
        config.save(&path)?;

        let content = std::fs::read_to_string(&path)?;
        assert!(content.contains("mac_address = \"AA:BB:CC:DD:EE:FF\""));

        let reloaded = Config::from_file(&path)?;
        assert_eq!(reloaded, config);
        assert_eq!(
            reloaded.target_identity().mac_address,
            Some(MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]))
        );
        Ok(())
    }

    #[test]
    fn test_zero_mac_means_unresolved() {
        let content = MINIMAL.replace(
            "host = \"nas.local\"",
            "host = \"nas.local\"\nmac_address = \"00:00:00:00:00:00\"",
        );
        let config: Config = toml::from_str(&content).unwrap();
        assert_eq!(config.target_identity().mac_address, None);
    }

    #[test]
    fn test_invalid_mac_is_rejected() {
        let content = MINIMAL.replace(
            "host = \"nas.local\"",
            "host = \"nas.local\"\nmac_address = \"not-a-mac\"",
        );
        assert!(toml::from_str::<Config>(&content).is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../config.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.target.host, "nas.local");
        assert_eq!(config.wake_config().probe_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_validate_requires_host_and_commands() {
        assert!(matches!(Config::default().validate(), Err(WakerError::Config(_))));

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.schedule.max_completion_polls = 0;
        assert!(config.validate().is_err());
    }
}
