//! Periodic coverage polling and stop-policy evaluation.
//!
//! The [`CoverageAggregator`] runs on its own task. Every tick it reads each
//! active worker's snapshot, updates the [`CoverageBoard`], applies the
//! coverage-limit and error policies, and publishes the fleet total. A stop
//! intent is acted on once the pass completes.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use memfleet_engine::{CoverageAggregator, CoverageBoard, PollPolicy, StopSwitch};
//! # async fn example(fleet: Arc<memfleet_worker::WorkerFleet>) {
//! let board = Arc::new(CoverageBoard::new(fleet.capacity()));
//! let switch = StopSwitch::new();
//! let policy = PollPolicy { stop_at_percent: Some(400), stop_on_error: true };
//!
//! let aggregator = Arc::new(CoverageAggregator::new(fleet, board, switch.clone(), 8, policy));
//! let handle = aggregator.start();
//!
//! let reason = switch.wait().await;
//! let summary = handle.await.unwrap();
//! println!("{reason}: {}", summary.total);
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use memfleet_config::FleetConfig;
use memfleet_core::{Clock, CoverageRecord};
use memfleet_worker::WorkerFleet;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::board::CoverageBoard;
use crate::stop::{StopReason, StopSwitch};

/// Default interval between poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Lifecycle of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    Idle,
    Polling,
    Stopping,
}

/// Stop policies evaluated every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollPolicy {
    /// Stop a worker once its coverage exceeds this percentage
    pub stop_at_percent: Option<u32>,
    /// Stop the fleet once any worker reports an error
    pub stop_on_error: bool,
}

impl From<&FleetConfig> for PollPolicy {
    fn from(config: &FleetConfig) -> Self {
        Self {
            stop_at_percent: config.stop_at_percent,
            stop_on_error: config.stop_on_error,
        }
    }
}

/// Result of one pass over the active workers.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Every worker was read and the total was published
    Complete {
        total: CoverageRecord,
        stop: Option<StopReason>,
    },
    /// Worker `index` could not be read; the total was left untouched
    Skipped { index: usize },
}

/// What the poll loop did before it halted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollSummary {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub stop_reason: Option<StopReason>,
    pub total: CoverageRecord,
}

#[derive(Debug)]
pub struct CoverageAggregator {
    fleet: Arc<WorkerFleet>,
    board: Arc<CoverageBoard>,
    switch: StopSwitch,
    clock: Arc<dyn Clock>,
    active_count: usize,
    policy: PollPolicy,
    interval: Duration,
    state: Mutex<PollState>,
}

impl CoverageAggregator {
    pub fn new(
        fleet: Arc<WorkerFleet>,
        board: Arc<CoverageBoard>,
        switch: StopSwitch,
        active_count: usize,
        policy: PollPolicy,
    ) -> Self {
        let clock = fleet.clock();
        Self {
            fleet,
            board,
            switch,
            clock,
            active_count,
            policy,
            interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(PollState::Idle),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PollState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Spawn the poll loop on its own task.
    pub fn start(self: Arc<Self>) -> JoinHandle<PollSummary> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            workers = self.active_count,
            "Starting coverage poll loop"
        );
        tokio::spawn(async move { self.run().await })
    }

    /// Poll until a stop is triggered, then run one final pass without
    /// policies and return to idle.
    pub async fn run(&self) -> PollSummary {
        self.set_state(PollState::Polling);
        let mut ticks = 0;
        let mut skipped_ticks = 0;

        while !self.switch.is_triggered() {
            match self.poll_once(true).await {
                TickOutcome::Complete { stop, .. } => {
                    ticks += 1;
                    if let Some(reason) = stop {
                        if self.switch.trigger(reason) {
                            info!(%reason, "Stop condition reached");
                            self.fleet.stop_all(self.active_count).await;
                        }
                        break;
                    }
                }
                TickOutcome::Skipped { .. } => skipped_ticks += 1,
            }

            tokio::select! {
                _ = self.clock.sleep(self.interval) => {}
                _ = self.switch.wait() => {}
            }
        }

        self.set_state(PollState::Stopping);
        if let TickOutcome::Skipped { index } = self.poll_once(false).await {
            debug!(worker = index, "Final pass could not read worker");
        }

        let summary = PollSummary {
            ticks,
            skipped_ticks,
            stop_reason: self.switch.reason(),
            total: self.board.total(),
        };
        self.set_state(PollState::Idle);
        info!(ticks, skipped_ticks, "Coverage poll loop stopped");
        summary
    }

    /// One pass over every active worker.
    ///
    /// With `check_policies` unset only the board is updated; no worker is
    /// stopped and no stop intent is raised.
    pub async fn poll_once(&self, check_policies: bool) -> TickOutcome {
        let mut coverage_sum = 0.0;
        let mut error_sum = 0;
        let mut stop = None;

        for index in 0..self.active_count {
            let snapshot = match self.fleet.snapshot(index).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(error = %e, "Skipping tick");
                    return TickOutcome::Skipped { index };
                }
            };

            self.board.update_worker(index, snapshot);

            if check_policies && let Some(handle) = self.fleet.handle(index).await {
                if let Some(limit) = self.policy.stop_at_percent
                    && snapshot.coverage_percent > f64::from(limit)
                    && !handle.is_finished()
                {
                    debug!(
                        worker = index,
                        coverage = snapshot.coverage_percent,
                        limit,
                        "Coverage limit reached"
                    );
                    handle.stop().await;
                }

                if self.policy.stop_on_error {
                    let errored = snapshot.error_count > 0;
                    self.board.set_errored(index, errored);
                    if errored {
                        warn!(
                            worker = index,
                            errors = snapshot.error_count,
                            "Worker reported errors"
                        );
                        handle.dismiss_error_notice().await;
                        stop.get_or_insert(StopReason::ErrorDetected { index });
                    }
                }
            }

            coverage_sum += snapshot.coverage_percent;
            error_sum += snapshot.error_count;
        }

        let mean = if self.active_count == 0 {
            0.0
        } else {
            coverage_sum / self.active_count as f64
        };
        let total = self.board.publish_total(mean, error_sum);

        if check_policies && stop.is_none() && self.fleet.all_finished(self.active_count).await {
            stop = Some(StopReason::AllFinished);
        }

        TickOutcome::Complete { total, stop }
    }
}
