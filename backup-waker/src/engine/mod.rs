//! Backup engine boundary.
//!
//! The engine is an opaque service: it can be told to start, stop or reload,
//! and it reports progress only through its status query.

pub mod command;
pub mod error_codes;

use async_trait::async_trait;
use thiserror::Error;

pub use command::CommandEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {message}")]
    CommandFailed {
        command: String,
        code: Option<u32>,
        message: String,
    },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Malformed status report: {0}")]
    MalformedStatus(String),

    #[error("Engine operation not configured: {0}")]
    NotConfigured(&'static str),
}

/// Raw status report as the engine hands it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatus {
    pub flags: u32,
    pub last_backup_text: String,
}

#[async_trait]
pub trait StatusQuery: Send + Sync {
    async fn query(&self) -> Result<RawStatus, EngineError>;
}

/// Fire-and-forget engine controls. Completion shows up only in the status.
#[async_trait]
pub trait BackupEngine: Send + Sync {
    async fn start_backup(&self, low_priority: bool) -> Result<(), EngineError>;

    async fn stop_backup(&self) -> Result<(), EngineError>;

    async fn reload_configuration(&self) -> Result<(), EngineError>;
}
