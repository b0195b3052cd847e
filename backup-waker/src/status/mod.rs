//! Backup engine protection status: flag decoding and report normalization.

pub mod normalizer;
pub mod state;

pub use normalizer::{normalize, LastBackup, NormalizedStatus};
pub use state::{ProtectionState, Quality};
