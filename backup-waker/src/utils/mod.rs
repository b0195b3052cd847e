//! Utility modules for the backup waker.

pub mod errors;
pub mod logger;
pub mod time;

pub use errors::{Result, WakerError};
