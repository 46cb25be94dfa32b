//! Periodic snapshot cycles.
//!
//! [`run_scheduled`] drives [`run_once`] on a fixed interval:
//!
//! - **Immediate first run**: the first cycle starts at startup unless
//!   `run_on_startup` is off, in which case it waits one interval.
//! - **No overlap**: the loop awaits each cycle before waiting for the next
//!   tick. Ticks missed during a long cycle are skipped, not queued.
//! - **Bounded cycles**: each cycle is cancelled after `run_timeout`. A
//!   cancelled cycle never reaches its sink write, or the write's
//!   transaction is dropped before commit.
//! - **Failure isolation**: a failed cycle is logged and the loop continues;
//!   the next tick simply runs again.
//! - **Clean shutdown**: the loop stops when the shutdown channel flips to
//!   `true`, or after `max_runs` cycles when configured. A shutdown during a
//!   cycle abandons that cycle the same way a timeout does.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval_at, timeout};
use tracing::{error, info};

use crate::run::{RunReport, run_once};
use crate::snapshot::SnapshotBuilder;
use crate::source::{BalanceSource, EventSource, SnapshotSink};

/// Timing and bounds for the scheduled loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Upper bound on a single cycle.
    pub run_timeout: Duration,
    /// Start the first cycle immediately.
    pub run_on_startup: bool,
    /// Stop after this many cycles.
    pub max_runs: Option<u64>,
}

impl ScheduleSettings {
    /// Settings from the `schedule` config section.
    pub const fn from_config(config: &crate::config::ScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            run_on_startup: config.run_on_startup,
            max_runs: config.max_runs,
        }
    }
}

/// How one scheduled cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The cycle completed.
    Completed(RunReport),
    /// The cycle returned an error.
    Failed(crate::run::RunError),
    /// The cycle exceeded the run timeout and was cancelled.
    TimedOut,
    /// Shutdown was requested while the cycle was running.
    Interrupted,
}

/// Counts of cycle outcomes over the life of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Cycles started.
    pub runs: u64,
    /// Cycles that completed.
    pub completed: u64,
    /// Cycles that returned an error.
    pub failed: u64,
    /// Cycles cancelled by the run timeout.
    pub timed_out: u64,
    /// Cycles abandoned because of shutdown.
    pub interrupted: u64,
}

impl ScheduleSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.runs = self.runs.saturating_add(1);
        match outcome {
            CycleOutcome::Completed(_) => self.completed = self.completed.saturating_add(1),
            CycleOutcome::Failed(_) => self.failed = self.failed.saturating_add(1),
            CycleOutcome::TimedOut => self.timed_out = self.timed_out.saturating_add(1),
            CycleOutcome::Interrupted => self.interrupted = self.interrupted.saturating_add(1),
        }
    }
}

/// Run one cycle under the run timeout.
pub async fn run_bounded<E, B, S>(
    events: &E,
    balances: &B,
    sink: &S,
    builder: &SnapshotBuilder,
    run_timeout: Duration,
) -> CycleOutcome
where
    E: EventSource,
    B: BalanceSource,
    S: SnapshotSink,
{
    match timeout(run_timeout, run_once(events, balances, sink, builder)).await {
        Ok(Ok(report)) => CycleOutcome::Completed(report),
        Ok(Err(e)) => {
            error!(error = %e, "Snapshot cycle failed");
            CycleOutcome::Failed(e)
        }
        Err(_) => {
            error!(
                timeout_secs = run_timeout.as_secs(),
                "Snapshot cycle timed out; results discarded"
            );
            CycleOutcome::TimedOut
        }
    }
}

/// Run snapshot cycles until shutdown or `max_runs`.
pub async fn run_scheduled<E, B, S>(
    events: &E,
    balances: &B,
    sink: &S,
    builder: &SnapshotBuilder,
    settings: ScheduleSettings,
    mut shutdown: watch::Receiver<bool>,
) -> ScheduleSummary
where
    E: EventSource,
    B: BalanceSource,
    S: SnapshotSink,
{
    let start = if settings.run_on_startup {
        tokio::time::Instant::now()
    } else {
        tokio::time::Instant::now()
            .checked_add(settings.interval)
            .unwrap_or_else(tokio::time::Instant::now)
    };
    let mut ticker = interval_at(start, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = settings.interval.as_secs(),
        run_timeout_secs = settings.run_timeout.as_secs(),
        run_on_startup = settings.run_on_startup,
        max_runs = settings.max_runs,
        "Scheduler starting"
    );

    let mut summary = ScheduleSummary::default();
    loop {
        if *shutdown.borrow() {
            break;
        }
        if settings.max_runs.is_some_and(|max| summary.runs >= max) {
            info!(runs = summary.runs, "Run limit reached");
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                // A dropped sender also means stop.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let outcome = tokio::select! {
            outcome = run_bounded(events, balances, sink, builder, settings.run_timeout) => outcome,
            _ = shutdown.wait_for(|stop| *stop) => {
                info!("Shutdown requested mid-cycle; abandoning it");
                CycleOutcome::Interrupted
            }
        };
        summary.record(&outcome);
        if matches!(outcome, CycleOutcome::Interrupted) {
            break;
        }
    }

    info!(
        runs = summary.runs,
        completed = summary.completed,
        failed = summary.failed,
        timed_out = summary.timed_out,
        interrupted = summary.interrupted,
        "Scheduler stopped"
    );
    summary
}
