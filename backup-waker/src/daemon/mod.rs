//! Daemon lifecycle support.

pub mod shutdown;
