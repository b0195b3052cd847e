//! Engine adapter that drives the backup engine through external commands.
//!
//! Each operation maps to a configured command line. The status command must
//! print `<flags> <last backup text>` on stdout, flags in decimal or `0x` hex.
//! On failure, a `0x`-prefixed result code in stderr is mapped through the
//! engine's error table.

use super::error_codes;
use super::{BackupEngine, EngineError, RawStatus, StatusQuery};
use crate::config::EngineConfig;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable telling the start command which I/O priority to use.
pub const LOW_PRIORITY_ENV: &str = "BACKUP_LOW_PRIORITY";

pub struct CommandEngine {
    status_command: Vec<String>,
    start_command: Vec<String>,
    stop_command: Vec<String>,
    reload_command: Vec<String>,
    timeout: Duration,
}

impl CommandEngine {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            status_command: config.status_command.clone(),
            start_command: config.start_command.clone(),
            stop_command: config.stop_command.clone(),
            reload_command: config.reload_command.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    async fn run(
        &self,
        name: &'static str,
        argv: &[String],
        envs: &[(&str, &str)],
    ) -> Result<String, EngineError> {
        let (program, args) = argv.split_first().ok_or(EngineError::NotConfigured(name))?;
        let command_line = argv.join(" ");

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(envs.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %command_line, "Running engine command");
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| EngineError::Spawn {
                command: command_line.clone(),
                source,
            })?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    command: command_line,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = error_codes::extract_code(&stderr);
            let fallback = match stderr.trim() {
                "" => output.status.to_string(),
                text => text.to_string(),
            };
            return Err(EngineError::CommandFailed {
                command: command_line,
                code,
                message: error_codes::message_for(code, &fallback),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl StatusQuery for CommandEngine {
    async fn query(&self) -> Result<RawStatus, EngineError> {
        let stdout = self.run("status", &self.status_command, &[]).await?;
        parse_status_output(&stdout)
    }
}

#[async_trait]
impl BackupEngine for CommandEngine {
    async fn start_backup(&self, low_priority: bool) -> Result<(), EngineError> {
        let flag = if low_priority { "1" } else { "0" };
        self.run("start", &self.start_command, &[(LOW_PRIORITY_ENV, flag)])
            .await?;
        info!(low_priority, "Started a backup");
        Ok(())
    }

    async fn stop_backup(&self) -> Result<(), EngineError> {
        self.run("stop", &self.stop_command, &[]).await?;
        info!("Stopped backup");
        Ok(())
    }

    async fn reload_configuration(&self) -> Result<(), EngineError> {
        self.run("reload", &self.reload_command, &[]).await?;
        info!("Reloaded backup engine configuration");
        Ok(())
    }
}

/// Parse `<flags> <last backup text>`. The text is kept verbatim, including
/// any non-ASCII marks; normalization happens later.
pub fn parse_status_output(stdout: &str) -> Result<RawStatus, EngineError> {
    let line = stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| EngineError::MalformedStatus("empty output".to_string()))?
        .trim_start();

    let (flags_text, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));

    let flags = match flags_text
        .strip_prefix("0x")
        .or_else(|| flags_text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => flags_text.parse(),
    }
    .map_err(|_| EngineError::MalformedStatus(format!("bad flags `{flags_text}`")))?;

    Ok(RawStatus {
        flags,
        last_backup_text: rest.trim_end().to_string(),
    })
}
