//! Custom error types for the backup waker.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WakerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),
}

pub type Result<T> = std::result::Result<T, WakerError>;
