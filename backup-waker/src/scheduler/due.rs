//! When is the next backup due?

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Floor for any computed sleep, so a degenerate schedule cannot spin.
pub const MIN_SLEEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub interval: Duration,
    pub backup_duration_estimate: Duration,
    pub max_completion_polls: u32,
    pub low_priority: bool,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            backup_duration_estimate: Duration::from_secs(600),
            max_completion_polls: 3,
            low_priority: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueCheck {
    /// `overdue_by` is `None` when the last backup time is unknown.
    Due { overdue_by: Option<Duration> },
    NotDue { sleep_for: Duration },
}

impl DueCheck {
    pub fn is_due(&self) -> bool {
        matches!(self, DueCheck::Due { .. })
    }
}

/// Classify the schedule at `now`. An unknown last backup is always due.
///
/// When not due, the sleep runs past the next interval boundary by the backup
/// duration estimate, so the engine has had time to report the backup it runs
/// on its own.
pub fn check_due(
    settings: &ScheduleSettings,
    last_backup: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DueCheck {
    let Some(last_backup) = last_backup else {
        return DueCheck::Due { overdue_by: None };
    };

    // a last backup in the future (clock skew) counts as "just now"
    let elapsed = (now - last_backup).to_std().unwrap_or(Duration::ZERO);

    if elapsed > settings.interval {
        return DueCheck::Due {
            overdue_by: Some(elapsed - settings.interval),
        };
    }

    let sleep_for = (settings.interval - elapsed).saturating_add(settings.backup_duration_estimate);
    if sleep_for.is_zero() {
        DueCheck::Due {
            overdue_by: Some(Duration::ZERO),
        }
    } else {
        DueCheck::NotDue { sleep_for }
    }
}

/// Sleep after a finished or abandoned cycle. Falls back to a full interval
/// when the schedule would call for another backup straight away.
pub fn next_sleep(
    settings: &ScheduleSettings,
    last_backup: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    let sleep_for = match check_due(settings, last_backup, now) {
        DueCheck::NotDue { sleep_for } => sleep_for,
        DueCheck::Due { .. } => settings
            .interval
            .saturating_add(settings.backup_duration_estimate),
    };
    sleep_for.max(MIN_SLEEP)
}
