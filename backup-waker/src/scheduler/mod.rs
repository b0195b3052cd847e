//! Backup scheduler: the control loop.
//!
//! Each cycle reads the engine status, decides whether a backup is due, wakes
//! the target, starts the backup and checks for completion a bounded number of
//! times. Exactly one cycle is in flight; every wait is a single cancellable
//! sleep. A backup that is still running after the last completion check is
//! treated as stuck and stops the scheduler with an error.

pub mod clock;
pub mod due;

use crate::engine::{BackupEngine, StatusQuery};
use crate::status::{normalize, LastBackup, NormalizedStatus};
use crate::target::{Reachability, TargetAvailability, TargetIdentity};
use crate::utils::time;
use chrono::Local;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use clock::{SystemTimeProvider, TimeProvider};
pub use due::{check_due, next_sleep, DueCheck, ScheduleSettings};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Backup still running after {polls} completion checks ({expected:?} each)")]
    BackupStuck { polls: u32, expected: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    CheckingDue,
    WakingTarget,
    BackupStarting,
    AwaitingCompletion(u32),
    BackupAbandoned,
    Sleeping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::AwaitingCompletion(polls) => write!(f, "AwaitingCompletion({polls})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Sleep(Duration),
    Abandoned { polls: u32 },
    Shutdown,
}

pub struct BackupScheduler {
    settings: ScheduleSettings,
    identity: TargetIdentity,
    identity_tx: watch::Sender<TargetIdentity>,
    status: Arc<dyn StatusQuery>,
    engine: Arc<dyn BackupEngine>,
    availability: TargetAvailability,
    clock: Arc<dyn TimeProvider>,
    shutdown: CancellationToken,
    state: SchedulerState,
}

impl BackupScheduler {
    pub fn new(
        settings: ScheduleSettings,
        identity: TargetIdentity,
        status: Arc<dyn StatusQuery>,
        engine: Arc<dyn BackupEngine>,
        availability: TargetAvailability,
        shutdown: CancellationToken,
    ) -> Self {
        let (identity_tx, _) = watch::channel(identity.clone());
        Self {
            settings,
            identity,
            identity_tx,
            status,
            engine,
            availability,
            clock: Arc::new(SystemTimeProvider),
            shutdown,
            state: SchedulerState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn identity(&self) -> &TargetIdentity {
        &self.identity
    }

    /// Receive the target identity whenever the scheduler learns something new
    /// about it (a freshly resolved hardware address). Persisting it is up to
    /// the receiver.
    pub fn subscribe_identity(&self) -> watch::Receiver<TargetIdentity> {
        self.identity_tx.subscribe()
    }

    /// Run cycles until shutdown. Returns an error only when a backup is stuck.
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            backup_duration_secs = self.settings.backup_duration_estimate.as_secs(),
            max_completion_polls = self.settings.max_completion_polls,
            host = %self.identity.host,
            "Backup scheduler started"
        );

        while !self.shutdown.is_cancelled() {
            let CycleOutcome::Sleep(sleep_for) = self.run_once().await? else {
                break;
            };

            self.transition(SchedulerState::Sleeping);
            info!(
                until = %self.local_time_after(sleep_for),
                sleep_secs = sleep_for.as_secs(),
                "Sleeping..."
            );
            if !self.pause(sleep_for).await {
                break;
            }
            info!("Woke from sleep");
        }

        self.transition(SchedulerState::Idle);
        info!("Backup scheduler stopped");
        Ok(())
    }

    /// Run a single cycle, turning an abandoned backup into an error.
    pub async fn run_once(&mut self) -> Result<CycleOutcome, SchedulerError> {
        match self.run_cycle().await {
            CycleOutcome::Abandoned { polls } => Err(SchedulerError::BackupStuck {
                polls,
                expected: self.settings.backup_duration_estimate,
            }),
            outcome => Ok(outcome),
        }
    }

    /// One pass from `CheckingDue` to the point where the loop either sleeps,
    /// gives up on a stuck backup or shuts down.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let span = info_span!("cycle", id = %Uuid::new_v4());
        self.cycle().instrument(span).await
    }

    async fn cycle(&mut self) -> CycleOutcome {
        self.transition(SchedulerState::CheckingDue);
        let status = self.read_status().await;
        let now = self.clock.now();

        match check_due(&self.settings, status.last_backup.known(), now) {
            DueCheck::NotDue { sleep_for } => {
                info!("Backup not due yet");
                return CycleOutcome::Sleep(sleep_for);
            }
            DueCheck::Due { overdue_by: Some(overdue_by) } => {
                info!(overdue_secs = overdue_by.as_secs(), "Backup overdue");
            }
            DueCheck::Due { overdue_by: None } => {
                info!("Last backup time unknown, treating backup as overdue");
            }
        }

        self.transition(SchedulerState::WakingTarget);
        let reachability = self
            .availability
            .ensure_reachable(&mut self.identity, &self.shutdown)
            .await;
        self.publish_identity();

        match reachability {
            Reachability::Reachable => info!("Backup target initialized"),
            Reachability::Cancelled => return CycleOutcome::Shutdown,
            Reachability::Unreachable => {
                error!(host = %self.identity.host, "Backup target unavailable, skipping this cycle");
                return CycleOutcome::Sleep(next_sleep(
                    &self.settings,
                    status.last_backup.known(),
                    now,
                ));
            }
        }

        self.transition(SchedulerState::BackupStarting);
        info!("Starting backup...");
        if let Err(e) = self.engine.start_backup(self.settings.low_priority).await {
            // completion is judged from the status either way
            error!(error = %e, "Backup engine rejected start request");
        }

        self.await_completion().await
    }

    async fn await_completion(&mut self) -> CycleOutcome {
        let max_polls = self.settings.max_completion_polls;
        let wait = self.settings.backup_duration_estimate;
        let mut polls = 0;
        self.transition(SchedulerState::AwaitingCompletion(polls));

        while polls < max_polls {
            info!(
                until = %self.local_time_after(wait),
                wait_secs = wait.as_secs(),
                "Waiting for backup to complete..."
            );
            if !self.pause(wait).await {
                return CycleOutcome::Shutdown;
            }

            let status = self.read_status().await;
            if !status.state.is_running() {
                info!("Backup completed");
                return CycleOutcome::Sleep(next_sleep(
                    &self.settings,
                    status.last_backup.known(),
                    self.clock.now(),
                ));
            }

            polls += 1;
            info!(polls, "Backup still running...");
            self.transition(SchedulerState::AwaitingCompletion(polls));
        }

        self.transition(SchedulerState::BackupAbandoned);
        warn!(
            polls,
            expected_secs = wait.as_secs(),
            "Backup taking {}x as long as expected, terminating",
            polls
        );
        CycleOutcome::Abandoned { polls }
    }

    /// Query and normalize the engine status. Failures become `UpdateFailed`.
    async fn read_status(&self) -> NormalizedStatus {
        let raw = match self.status.query().await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Could not query protection status");
                return NormalizedStatus::update_failed();
            }
        };

        let status = normalize(raw.flags, &raw.last_backup_text);
        let quality = status.state.quality();
        match status.last_backup {
            LastBackup::Known(at) => info!(
                state = %status.state,
                last_backup = %at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                "{}",
                quality.description()
            ),
            LastBackup::ParseFailure => info!(
                state = %status.state,
                raw_last_backup = %raw.last_backup_text.escape_debug(),
                "{} (last backup time unreadable)",
                quality.description()
            ),
        }
        status
    }

    /// Sleep for `duration`; `false` if shutdown interrupted it.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.cancelled() => {
                debug!(state = %self.state, "Wait interrupted by shutdown");
                false
            }
        }
    }

    fn publish_identity(&self) {
        let identity = self.identity.clone();
        self.identity_tx.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "State transition");
            self.state = next;
        }
    }

    fn local_time_after(&self, duration: Duration) -> String {
        time::local_time_after(self.clock.now(), duration)
    }
}
