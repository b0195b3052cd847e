//! Backup Waker Library
//!
//! Schedules backups to a network target that may be asleep: decides when a
//! backup is due, wakes the target with a wake-on-LAN packet, starts the backup
//! engine and gives up on backups that overrun their expected duration.

pub mod config;
pub mod daemon;
pub mod engine;
pub mod scheduler;
pub mod status;
pub mod target;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use scheduler::{BackupScheduler, SchedulerError};
pub use utils::errors::WakerError;
pub type Result<T> = std::result::Result<T, WakerError>;
