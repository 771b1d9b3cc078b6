//! Top-level sequencing of a run.
//!
//! The [`Orchestrator`] validates the config bundle, starts the fleet, arms
//! the poll loop and the stats ticker, and owns the stop sequence:
//!
//! 1. A stop is requested (by the user or by a policy in the poll loop)
//! 2. The poll loop and the stats ticker halt
//! 3. The fleet is given up to the drain timeout to finish
//! 4. A final pass refreshes the coverage table
//! 5. A [`ShutdownReport`] is returned and the orchestrator is idle again

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use memfleet_config::FleetConfig;
use memfleet_core::{Clock, CoverageRecord, FleetError, LayoutSettings, Result};
use memfleet_worker::{WorkerFleet, layout};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregator::{
    CoverageAggregator, DEFAULT_POLL_INTERVAL, PollPolicy, PollSummary, TickOutcome,
};
use crate::board::CoverageBoard;
use crate::stats::{Estimate, ProgressReport, estimate};
use crate::stop::{StopReason, StopSwitch};

/// Default interval between stats ticks.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(1);

/// How the drain phase of a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownOutcome {
    /// Every worker finished within the timeout
    CleanStop,
    /// Some workers were still running when the timeout elapsed
    DrainTimeout,
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    pub stop_reason: StopReason,
    pub final_total: CoverageRecord,
    /// Total row followed by every active worker row
    pub rows: Vec<CoverageRecord>,
    /// False when the final pass could not read every worker and the
    /// last-known totals are reported instead
    pub final_snapshot_fresh: bool,
    pub elapsed: Duration,
    pub estimate: Option<Estimate>,
    pub finished_at: DateTime<Utc>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.outcome == ShutdownOutcome::CleanStop
    }
}

#[derive(Debug)]
struct ActiveRun {
    config: FleetConfig,
    switch: StopSwitch,
    aggregator: Arc<CoverageAggregator>,
    poll_task: JoinHandle<PollSummary>,
    stats_task: JoinHandle<()>,
    started_at: Instant,
}

#[derive(Debug)]
pub struct Orchestrator {
    fleet: Arc<WorkerFleet>,
    board: Arc<CoverageBoard>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    stats_interval: Duration,
    run: Mutex<Option<ActiveRun>>,
    progress: Arc<watch::Sender<Option<ProgressReport>>>,
}

impl Orchestrator {
    pub fn new(fleet: Arc<WorkerFleet>) -> Self {
        let board = Arc::new(CoverageBoard::new(fleet.capacity()));
        let clock = fleet.clock();
        let (progress, _rx) = watch::channel(None);
        Self {
            fleet,
            board,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stats_interval: DEFAULT_STATS_INTERVAL,
            run: Mutex::new(None),
            progress: Arc::new(progress),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn board(&self) -> Arc<CoverageBoard> {
        Arc::clone(&self.board)
    }

    pub fn fleet(&self) -> Arc<WorkerFleet> {
        Arc::clone(&self.fleet)
    }

    /// Receive every stats tick.
    pub fn progress(&self) -> watch::Receiver<Option<ProgressReport>> {
        self.progress.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.run.lock().await.is_some()
    }

    /// Start the fleet described by `config` and begin polling.
    ///
    /// If any worker fails to start, every worker that did start is closed
    /// and [`FleetError::StartFailure`] is returned.
    #[instrument(level = "info", skip_all, fields(workers = config.thread_count))]
    pub async fn launch(&self, config: &FleetConfig) -> Result<()> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(FleetError::AlreadyRunning);
        }
        config.check(self.fleet.capacity())?;

        let count = config.thread_count;
        self.board.reset(count);

        let report = self
            .fleet
            .start_all(count, config.ram_share_mb(), config.start_minimised)
            .await?;
        if !report.all_started() {
            for failure in &report.failed {
                error!(worker = failure.index, reason = %failure.reason, "Worker failed to start");
            }
            self.fleet.close_all().await;
            return Err(FleetError::StartFailure {
                requested: count,
                started: report.started.len(),
                failed: report.failed_indices(),
            });
        }

        if !config.start_minimised {
            let plan = layout::plan(count, &config.layout, self.fleet.window_size())?;
            self.fleet.apply_layout(&plan).await;
        }

        let switch = StopSwitch::new();
        let aggregator = Arc::new(
            CoverageAggregator::new(
                Arc::clone(&self.fleet),
                Arc::clone(&self.board),
                switch.clone(),
                count,
                PollPolicy::from(config),
            )
            .with_interval(self.poll_interval),
        );
        let poll_task = Arc::clone(&aggregator).start();
        let started_at = self.clock.now();
        let stats_task = self.spawn_stats(switch.clone(), started_at, config.total_ram_mb);

        *run = Some(ActiveRun {
            config: config.clone(),
            switch,
            aggregator,
            poll_task,
            stats_task,
            started_at,
        });

        info!(
            workers = count,
            ram_mb = config.total_ram_mb,
            ram_share_mb = config.ram_share_mb(),
            "Fleet running"
        );
        Ok(())
    }

    /// Publish a [`ProgressReport`] every stats interval until the stop.
    fn spawn_stats(
        &self,
        switch: StopSwitch,
        started_at: Instant,
        total_ram_mb: u64,
    ) -> JoinHandle<()> {
        let board = Arc::clone(&self.board);
        let clock = Arc::clone(&self.clock);
        let progress = Arc::clone(&self.progress);
        let interval = self.stats_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = switch.wait() => break,
                    _ = clock.sleep(interval) => {}
                }
                let elapsed = clock.now().saturating_duration_since(started_at);
                let report = ProgressReport::new(elapsed, board.total(), total_ram_mb);
                debug!(%report, "Stats tick");
                progress.send_replace(Some(report));
            }
        })
    }

    /// Stop switch and config of the current run.
    async fn current(&self) -> Result<(StopSwitch, FleetConfig)> {
        let run = self.run.lock().await;
        let run = run.as_ref().ok_or(FleetError::NotRunning)?;
        Ok((run.switch.clone(), run.config.clone()))
    }

    /// Ask every worker to stop and halt the poll loop.
    #[instrument(level = "info", skip(self))]
    pub async fn request_stop(&self) -> Result<()> {
        let (switch, config) = self.current().await?;
        self.fleet.stop_all(config.thread_count).await;
        if switch.trigger(StopReason::UserRequested) {
            info!("Stop requested by user");
        }
        Ok(())
    }

    /// Wait until the current run is stopped, by the user or by a policy.
    pub async fn stopped(&self) -> Result<StopReason> {
        let (switch, _) = self.current().await?;
        Ok(switch.wait().await)
    }

    /// Wait for the stop, drain the fleet and report the final state.
    ///
    /// A drain timeout is reported in [`ShutdownReport::outcome`], not as an
    /// error; the orchestrator is idle afterwards either way.
    #[instrument(level = "info", skip(self))]
    pub async fn await_shutdown(&self, timeout: Duration) -> Result<ShutdownReport> {
        let (switch, _) = self.current().await?;
        let stop_reason = switch.wait().await;

        let run = self.run.lock().await.take().ok_or(FleetError::NotRunning)?;
        let active_count = run.config.thread_count;

        match run.poll_task.await {
            Ok(summary) => debug!(
                ticks = summary.ticks,
                skipped = summary.skipped_ticks,
                "Poll loop joined"
            ),
            Err(e) => warn!(error = %e, "Poll loop task failed"),
        }
        if let Err(e) = run.stats_task.await {
            warn!(error = %e, "Stats task failed");
        }

        let outcome = match self.fleet.wait_until_drained(active_count, timeout).await {
            Ok(()) => ShutdownOutcome::CleanStop,
            Err(e) => {
                warn!(error = %e, "Workers did not drain");
                ShutdownOutcome::DrainTimeout
            }
        };

        let final_snapshot_fresh = match run.aggregator.poll_once(false).await {
            TickOutcome::Complete { .. } => true,
            TickOutcome::Skipped { index } => {
                warn!(worker = index, "Final pass incomplete, reporting last-known totals");
                false
            }
        };

        let final_total = self.board.total();
        let elapsed = self.clock.now().saturating_duration_since(run.started_at);
        let report = ShutdownReport {
            outcome,
            stop_reason,
            estimate: estimate(elapsed, final_total.coverage_percent, run.config.total_ram_mb),
            final_total,
            rows: self.board.rows(),
            final_snapshot_fresh,
            elapsed,
            finished_at: Utc::now(),
        };

        info!(
            outcome = ?report.outcome,
            reason = %report.stop_reason,
            coverage = report.final_total.coverage_percent,
            errors = report.final_total.error_count,
            "Run finished"
        );
        Ok(report)
    }

    /// Restore every worker window and tile it again.
    ///
    /// Windows started minimised have never been placed, and the offsets may
    /// have changed while they were hidden.
    pub async fn show_all(&self) -> Result<()> {
        let (_, config) = self.current().await?;
        self.fleet.set_all_minimised(config.thread_count, false).await;
        let plan = layout::plan(config.thread_count, &config.layout, self.fleet.window_size())?;
        self.fleet.apply_layout(&plan).await;
        Ok(())
    }

    /// Minimise every worker window.
    pub async fn hide_all(&self) -> Result<()> {
        let (_, config) = self.current().await?;
        self.fleet.set_all_minimised(config.thread_count, true).await;
        Ok(())
    }

    /// Re-tile the running workers with new layout settings.
    pub async fn apply_layout(&self, settings: &LayoutSettings) -> Result<()> {
        let mut run = self.run.lock().await;
        let run = run.as_mut().ok_or(FleetError::NotRunning)?;

        let plan = layout::plan(run.config.thread_count, settings, self.fleet.window_size())?;
        self.fleet.apply_layout(&plan).await;
        run.config.layout = *settings;
        Ok(())
    }

    /// Force-close every worker, abandoning a run that is still active.
    #[instrument(level = "info", skip(self))]
    pub async fn close_all(&self) {
        if let Some(run) = self.run.lock().await.take() {
            run.switch.trigger(StopReason::UserRequested);
            run.poll_task.abort();
            run.stats_task.abort();
        }
        self.fleet.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memfleet_core::SteppedClock;
    use memfleet_worker::WorkerHandle;
    use memfleet_worker::testing::{ScriptedProvider, WorkerScript};

    fn orchestrator(provider: &Arc<ScriptedProvider>) -> Orchestrator {
        let fleet = WorkerFleet::new(provider.clone(), Arc::new(SteppedClock::new()), 16);
        Orchestrator::new(Arc::new(fleet))
    }

    #[tokio::test]
    async fn test_operations_require_a_run() {
        let provider = Arc::new(ScriptedProvider::new());
        let orchestrator = orchestrator(&provider);

        assert!(matches!(orchestrator.request_stop().await, Err(FleetError::NotRunning)));
        assert!(matches!(orchestrator.show_all().await, Err(FleetError::NotRunning)));
        assert!(matches!(
            orchestrator.await_shutdown(Duration::from_secs(1)).await,
            Err(FleetError::NotRunning)
        ));
        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn test_launch_rejects_invalid_bundle() {
        let provider = Arc::new(ScriptedProvider::new());
        let orchestrator = orchestrator(&provider);
        let config = FleetConfig::new(6, 6000).with_layout(LayoutSettings {
            rows: 4,
            ..LayoutSettings::default()
        });

        let result = orchestrator.launch(&config).await;
        assert!(matches!(result, Err(FleetError::InvalidLayout { .. })));
        assert_eq!(provider.kill_strays_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_launch_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new());
        let orchestrator = orchestrator(&provider);
        let config = FleetConfig::new(2, 2000);

        orchestrator.launch(&config).await.unwrap();
        assert!(matches!(orchestrator.launch(&config).await, Err(FleetError::AlreadyRunning)));
        orchestrator.close_all().await;
        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn test_hide_show_and_relayout() {
        let provider = Arc::new(ScriptedProvider::new());
        let orchestrator = orchestrator(&provider);
        orchestrator.launch(&FleetConfig::new(4, 4000)).await.unwrap();

        orchestrator.hide_all().await.unwrap();
        assert!(provider.worker(3).unwrap().state().minimised);
        orchestrator.show_all().await.unwrap();
        assert!(!provider.worker(3).unwrap().state().minimised);

        let settings = LayoutSettings {
            rows: 2,
            x_offset: 30,
            ..LayoutSettings::default()
        };
        orchestrator.apply_layout(&settings).await.unwrap();
        let location = provider.worker(2).unwrap().state().location.unwrap();
        assert_eq!((location.x, location.y), (30, 247));

        let bad = LayoutSettings {
            rows: 3,
            ..LayoutSettings::default()
        };
        assert!(orchestrator.apply_layout(&bad).await.is_err());

        orchestrator.close_all().await;
    }

    #[tokio::test]
    async fn test_start_minimised_skips_layout() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(0, WorkerScript::steady(1.0, 0));
        let orchestrator = orchestrator(&provider);

        let config = FleetConfig::new(2, 2000).with_start_minimised(true);
        orchestrator.launch(&config).await.unwrap();

        let state = provider.worker(0).unwrap().state();
        assert!(state.minimised);
        assert_eq!(state.location, None);

        orchestrator.show_all().await.unwrap();
        for index in 0..2 {
            let state = provider.worker(index).unwrap().state();
            assert!(!state.minimised);
            assert!(state.location.is_some(), "worker {index} was never tiled");
        }
        orchestrator.close_all().await;
    }
}
