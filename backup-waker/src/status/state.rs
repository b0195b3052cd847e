//! Protection state reported by the backup engine.
//!
//! The engine packs its health summary into one flag word: the low byte holds
//! a single quality code and bit 8 marks a backup cycle in progress. Codes the
//! engine may add later are carried through untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality code carried in the low byte of the flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    NotTracked,
    Off,
    DisabledByGroupPolicy,
    FatalConfigurationError,
    TargetAccessDenied,
    TargetVolumeDirty,
    TargetFullRetentionMax,
    TargetFull,
    StagingFull,
    TargetLowSpaceRetentionMax,
    TargetLowSpace,
    TargetAbsent,
    TooMuchBehind,
    NoError,
    /// The status query itself failed.
    UpdateFailed,
    /// A code this build does not know about.
    Unknown(u8),
}

impl Quality {
    pub const fn code(self) -> u8 {
        match self {
            Quality::NotTracked => 0x00,
            Quality::Off => 0x01,
            Quality::DisabledByGroupPolicy => 0x02,
            Quality::FatalConfigurationError => 0x03,
            Quality::TargetAccessDenied => 0x0E,
            Quality::TargetVolumeDirty => 0x0F,
            Quality::TargetFullRetentionMax => 0x10,
            Quality::TargetFull => 0x11,
            Quality::StagingFull => 0x12,
            Quality::TargetLowSpaceRetentionMax => 0x13,
            Quality::TargetLowSpace => 0x14,
            Quality::TargetAbsent => 0x15,
            Quality::TooMuchBehind => 0x16,
            Quality::UpdateFailed => 0xEE,
            Quality::NoError => 0xFF,
            Quality::Unknown(code) => code,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            0x00 => Quality::NotTracked,
            0x01 => Quality::Off,
            0x02 => Quality::DisabledByGroupPolicy,
            0x03 => Quality::FatalConfigurationError,
            0x0E => Quality::TargetAccessDenied,
            0x0F => Quality::TargetVolumeDirty,
            0x10 => Quality::TargetFullRetentionMax,
            0x11 => Quality::TargetFull,
            0x12 => Quality::StagingFull,
            0x13 => Quality::TargetLowSpaceRetentionMax,
            0x14 => Quality::TargetLowSpace,
            0x15 => Quality::TargetAbsent,
            0x16 => Quality::TooMuchBehind,
            0xEE => Quality::UpdateFailed,
            0xFF => Quality::NoError,
            other => Quality::Unknown(other),
        }
    }

    /// Human-readable meaning, used in log lines.
    pub fn description(self) -> &'static str {
        match self {
            Quality::NotTracked => {
                "protection state unknown: the backup service is not started or the user is not tracked"
            }
            Quality::Off => "protection is not enabled for the current user",
            Quality::DisabledByGroupPolicy => "protection is disabled by group policy",
            Quality::FatalConfigurationError => {
                "a file storing internal backup configuration has a fatal error"
            }
            Quality::TargetAccessDenied => "the current user cannot write to the assigned target",
            Quality::TargetVolumeDirty => {
                "the target volume is marked dirty; backups resume after a disk check"
            }
            Quality::TargetFullRetentionMax => {
                "the target is full and retention is already at its most aggressive policy"
            }
            Quality::TargetFull => "the target does not have enough space for backup copies",
            Quality::StagingFull => "the local staging cache is out of space",
            Quality::TargetLowSpaceRetentionMax => {
                "the target is low on space and retention is already at its most aggressive policy"
            }
            Quality::TargetLowSpace => "the target is running low on free space",
            Quality::TargetAbsent => "the target has been unavailable for a long time",
            Quality::TooMuchBehind => "too many changes are pending for regular backup cycles",
            Quality::NoError => "backups run regularly and no errors are detected",
            Quality::UpdateFailed => "could not query the protection state",
            Quality::Unknown(_) => "unrecognized protection state",
        }
    }
}

/// Decoded flag word. Every bit of the raw word is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectionState(u32);

impl ProtectionState {
    pub const RUNNING: u32 = 0x100;
    const QUALITY_MASK: u32 = 0xFF;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn new(quality: Quality, running: bool) -> Self {
        let bits = quality.code() as u32;
        Self(if running { bits | Self::RUNNING } else { bits })
    }

    /// State used when the engine could not be queried. Never combined with
    /// `Running`.
    pub const fn update_failed() -> Self {
        Self(Quality::UpdateFailed.code() as u32)
    }

    pub const fn quality(self) -> Quality {
        Quality::from_code((self.0 & Self::QUALITY_MASK) as u8)
    }

    pub const fn is_running(self) -> bool {
        self.0 & Self::RUNNING != 0
    }

    pub const fn is_update_failed(self) -> bool {
        self.0 == Quality::UpdateFailed.code() as u32
    }

    /// Bits above the known quality byte and running flag.
    pub const fn unknown_bits(self) -> u32 {
        self.0 & !(Self::QUALITY_MASK | Self::RUNNING)
    }
}

impl fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.quality())?;
        if self.is_running() {
            write!(f, "+Running")?;
        }
        if self.unknown_bits() != 0 {
            write!(f, "+{:#x}", self.unknown_bits())?;
        }
        Ok(())
    }
}
