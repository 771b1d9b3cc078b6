//! Fixed-capacity set of worker handles.
//!
//! [`WorkerFleet`] owns one slot per possible worker. Every fleet-wide
//! operation fans out over the relevant handles concurrently and fully
//! joins before returning.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use memfleet_core::{Clock, CoverageSnapshot, FleetError, Result, WindowSize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::handle::{WorkerHandle, WorkerProvider};
use crate::layout::LayoutPlan;
use crate::types::{LaunchFailure, StartOutcome, StartReport};

/// Interval between `all_finished` checks while draining.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Apply `op` to every handle concurrently and wait for all of them.
async fn fan_out<T, F, Fut>(handles: Vec<Arc<dyn WorkerHandle>>, op: F) -> Vec<T>
where
    F: Fn(Arc<dyn WorkerHandle>) -> Fut,
    Fut: Future<Output = T>,
{
    join_all(handles.into_iter().map(op)).await
}

/// Slots of worker handles indexed `0..capacity`.
#[derive(Debug)]
pub struct WorkerFleet {
    provider: Arc<dyn WorkerProvider>,
    clock: Arc<dyn Clock>,
    slots: RwLock<Vec<Option<Arc<dyn WorkerHandle>>>>,
    capacity: usize,
    drain_poll: Duration,
}

impl WorkerFleet {
    pub fn new(provider: Arc<dyn WorkerProvider>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            provider,
            clock,
            slots: RwLock::new(vec![None; capacity]),
            capacity,
            drain_poll: DRAIN_POLL_INTERVAL,
        }
    }

    /// Override the drain poll interval (capped at one second).
    pub fn with_drain_poll(mut self, interval: Duration) -> Self {
        self.drain_poll = interval.min(Duration::from_secs(1));
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window_size(&self) -> WindowSize {
        self.provider.window_size()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Handle in slot `index`, if one is allocated.
    pub async fn handle(&self, index: usize) -> Option<Arc<dyn WorkerHandle>> {
        self.slots.read().await.get(index).cloned().flatten()
    }

    /// Best-effort snapshot of worker `index`.
    ///
    /// Fails with [`FleetError::UnreadableSnapshot`] when the slot is empty or
    /// the worker's counters cannot be read right now.
    pub async fn snapshot(&self, index: usize) -> Result<CoverageSnapshot> {
        self.handle(index)
            .await
            .and_then(|handle| handle.read_snapshot())
            .ok_or(FleetError::UnreadableSnapshot { index })
    }

    /// Allocated handles among the first `count` slots.
    async fn allocated(&self, count: usize) -> Vec<Arc<dyn WorkerHandle>> {
        self.slots
            .read()
            .await
            .iter()
            .take(count)
            .flatten()
            .cloned()
            .collect()
    }

    /// Kill leftover workers, then launch `count` fresh handles in parallel.
    ///
    /// Handles that started stay in their slots even when others failed; the
    /// caller decides whether to tear them down.
    #[instrument(level = "info", skip(self))]
    pub async fn start_all(
        &self,
        count: usize,
        ram_share_mb: f64,
        start_minimised: bool,
    ) -> Result<StartReport> {
        if count > self.capacity {
            return Err(FleetError::CapacityExceeded {
                requested: count,
                capacity: self.capacity,
            });
        }

        if let Err(e) = self.provider.kill_strays().await {
            warn!(error = %e, "failed to kill leftover workers");
        }

        let handles: Vec<Arc<dyn WorkerHandle>> =
            (0..count).map(|index| self.provider.create(index)).collect();
        {
            let mut slots = self.slots.write().await;
            slots.iter_mut().for_each(|slot| *slot = None);
            for handle in &handles {
                slots[handle.index()] = Some(Arc::clone(handle));
            }
        }

        let mut outcomes = fan_out(handles, |handle| async move {
            let outcome = handle.start(ram_share_mb, start_minimised).await;
            (handle.index(), outcome)
        })
        .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = StartReport {
            requested: count,
            ..StartReport::default()
        };
        for (index, outcome) in outcomes {
            match outcome {
                StartOutcome::Started => report.started.push(index),
                StartOutcome::FailedToLaunch { reason } => {
                    warn!(worker = index, %reason, "worker failed to launch");
                    report.failed.push(LaunchFailure { index, reason });
                }
            }
        }

        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "Fleet start complete"
        );
        Ok(report)
    }

    /// Ask every started, unfinished worker among the first `active_count`
    /// to terminate. Does not wait for them to exit.
    #[instrument(level = "info", skip(self))]
    pub async fn stop_all(&self, active_count: usize) {
        let handles: Vec<_> = self
            .allocated(active_count)
            .await
            .into_iter()
            .filter(|h| h.is_started() && !h.is_finished())
            .collect();
        debug!("Stopping {} workers", handles.len());
        fan_out(handles, |handle| async move { handle.stop().await }).await;
    }

    /// Force-close every allocated handle and empty the slots.
    ///
    /// A failure to close one worker is logged and never stops the rest.
    #[instrument(level = "info", skip(self))]
    pub async fn close_all(&self) {
        let handles: Vec<_> = {
            let mut slots = self.slots.write().await;
            slots.iter_mut().filter_map(Option::take).collect()
        };

        let results = fan_out(handles, |handle| async move {
            (handle.index(), handle.close().await)
        })
        .await;

        for (index, result) in results {
            if let Err(e) = result {
                warn!(worker = index, error = %e, "Failed to close worker");
            }
        }
    }

    /// Move every started worker to its planned position.
    #[instrument(level = "debug", skip_all, fields(workers = plan.len()))]
    pub async fn apply_layout(&self, plan: &LayoutPlan) {
        let handles: Vec<_> = self
            .allocated(plan.len())
            .await
            .into_iter()
            .filter(|h| h.is_started())
            .collect();
        fan_out(handles, |handle| async move {
            if let Some(location) = plan.location(handle.index()) {
                handle.set_location(location).await;
            }
        })
        .await;
    }

    /// Minimise or restore workers over the contiguous prefix of allocated
    /// slots, stopping at the first empty one.
    #[instrument(level = "debug", skip(self))]
    pub async fn set_all_minimised(&self, active_count: usize, minimised: bool) {
        let handles: Vec<_> = self
            .slots
            .read()
            .await
            .iter()
            .take(active_count)
            .map_while(|slot| slot.clone())
            .collect();
        fan_out(handles, |handle| async move {
            handle.set_minimised(minimised).await;
        })
        .await;
    }

    /// Whether every one of the first `active_count` workers has finished.
    pub async fn all_finished(&self, active_count: usize) -> bool {
        let slots = self.slots.read().await;
        slots
            .iter()
            .take(active_count)
            .all(|slot| slot.as_ref().is_some_and(|h| h.is_finished()))
    }

    /// Poll [`Self::all_finished`] until true or `timeout` elapses.
    #[instrument(level = "info", skip(self))]
    pub async fn wait_until_drained(&self, active_count: usize, timeout: Duration) -> Result<()> {
        let deadline = self.clock.now() + timeout;
        loop {
            if self.all_finished(active_count).await {
                debug!("All workers finished");
                return Ok(());
            }
            if self.clock.now() >= deadline {
                warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for workers to finish");
                return Err(FleetError::DrainTimeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
            self.clock.sleep(self.drain_poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::testing::{ScriptedProvider, WorkerScript};
    use memfleet_core::{LayoutSettings, Location, SteppedClock};

    fn fleet(provider: Arc<ScriptedProvider>, capacity: usize) -> (WorkerFleet, Arc<SteppedClock>) {
        let clock = Arc::new(SteppedClock::new());
        let fleet = WorkerFleet::new(provider, clock.clone(), capacity);
        (fleet, clock)
    }

    #[tokio::test]
    async fn test_start_all_reports_every_worker() {
        let provider = Arc::new(ScriptedProvider::new());
        let (fleet, _) = fleet(provider.clone(), 8);

        let report = fleet.start_all(4, 1024.0, false).await.unwrap();
        assert!(report.all_started());
        assert_eq!(report.started, vec![0, 1, 2, 3]);
        assert_eq!(provider.kill_strays_calls(), 1);

        for index in 0..4 {
            let worker = provider.worker(index).unwrap();
            assert!(worker.is_started());
            assert_eq!(worker.ram_share_mb(), Some(1024.0));
        }
        assert!(fleet.handle(4).await.is_none());
    }

    #[tokio::test]
    async fn test_start_all_collects_failures() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(2, WorkerScript::default().fail_launch("missing executable"));
        let (fleet, _) = fleet(provider.clone(), 8);

        let report = fleet.start_all(3, 100.0, false).await.unwrap();
        assert!(!report.all_started());
        assert_eq!(report.started, vec![0, 1]);
        assert_eq!(report.failed_indices(), vec![2]);
    }

    #[tokio::test]
    async fn test_start_all_rejects_over_capacity() {
        let provider = Arc::new(ScriptedProvider::new());
        let (fleet, _) = fleet(provider, 2);
        assert!(matches!(
            fleet.start_all(3, 100.0, false).await,
            Err(FleetError::CapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_of_empty_or_unreadable_worker() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(0, WorkerScript::steady(12.5, 0).then_read(None));
        let (fleet, _) = fleet(provider, 4);
        fleet.start_all(1, 100.0, false).await.unwrap();

        assert!(matches!(
            fleet.snapshot(0).await,
            Err(FleetError::UnreadableSnapshot { index: 0 })
        ));
        assert_eq!(fleet.snapshot(0).await.unwrap(), CoverageSnapshot::new(12.5, 0));
        assert!(matches!(
            fleet.snapshot(3).await,
            Err(FleetError::UnreadableSnapshot { index: 3 })
        ));
    }

    #[tokio::test]
    async fn test_stop_all_skips_finished_workers() {
        let provider = Arc::new(ScriptedProvider::new());
        let (fleet, _) = fleet(provider.clone(), 4);
        fleet.start_all(3, 100.0, false).await.unwrap();
        provider.worker(1).unwrap().finish();

        fleet.stop_all(3).await;

        assert_eq!(provider.worker(0).unwrap().stop_calls(), 1);
        assert_eq!(provider.worker(1).unwrap().stop_calls(), 0);
        assert_eq!(provider.worker(2).unwrap().stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_fleet_operations_run_on_spawned_tasks() {
        let provider = Arc::new(ScriptedProvider::new());
        let (fleet, _) = fleet(provider.clone(), 4);
        let fleet = Arc::new(fleet);

        let task_fleet = Arc::clone(&fleet);
        tokio::spawn(async move {
            task_fleet.start_all(2, 100.0, false).await.unwrap();
            task_fleet.set_all_minimised(2, true).await;
            task_fleet.stop_all(2).await;
        })
        .await
        .unwrap();

        for index in 0..2 {
            let worker = provider.worker(index).unwrap();
            assert_eq!(worker.stop_calls(), 1);
            assert!(worker.state().minimised);
        }

        let task_fleet = Arc::clone(&fleet);
        tokio::spawn(async move { task_fleet.close_all().await }).await.unwrap();
        assert!(fleet.handle(0).await.is_none());
    }

    #[tokio::test]
    async fn test_close_all_continues_after_failure() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(0, WorkerScript::default().fail_close());
        let (fleet, _) = fleet(provider.clone(), 4);
        fleet.start_all(3, 100.0, false).await.unwrap();

        fleet.close_all().await;

        for index in 0..3 {
            assert_eq!(provider.worker(index).unwrap().close_calls(), 1);
        }
        assert!(fleet.handle(0).await.is_none());
    }

    #[tokio::test]
    async fn test_apply_layout_positions_started_workers() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(3, WorkerScript::default().fail_launch("crashed"));
        let (fleet, _) = fleet(provider.clone(), 4);
        fleet.start_all(4, 100.0, false).await.unwrap();

        let settings = LayoutSettings {
            rows: 2,
            ..LayoutSettings::default()
        };
        let plan = layout::plan(4, &settings, fleet.window_size()).unwrap();
        fleet.apply_layout(&plan).await;

        assert_eq!(provider.worker(0).unwrap().state().location, Some(Location::new(0, 0)));
        assert_eq!(
            provider.worker(2).unwrap().state().location,
            plan.location(2)
        );
        assert_eq!(provider.worker(3).unwrap().state().location, None);
    }

    #[tokio::test]
    async fn test_set_all_minimised() {
        let provider = Arc::new(ScriptedProvider::new());
        let (fleet, _) = fleet(provider.clone(), 4);
        fleet.start_all(2, 100.0, false).await.unwrap();

        fleet.set_all_minimised(4, true).await;
        assert!(provider.worker(0).unwrap().state().minimised);
        assert!(provider.worker(1).unwrap().state().minimised);

        fleet.set_all_minimised(2, false).await;
        assert!(!provider.worker(0).unwrap().state().minimised);
    }

    #[tokio::test]
    async fn test_wait_until_drained() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(0, WorkerScript::default().finish_on_stop());
        provider.script(1, WorkerScript::default().finish_on_stop());
        let (fleet, _) = fleet(provider.clone(), 4);
        fleet.start_all(2, 100.0, false).await.unwrap();
        assert!(!fleet.all_finished(2).await);

        fleet.stop_all(2).await;
        assert!(fleet.all_finished(2).await);
        assert!(fleet.wait_until_drained(2, Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_until_drained_times_out() {
        let provider = Arc::new(ScriptedProvider::new());
        let (fleet, clock) = fleet(provider.clone(), 4);
        fleet.start_all(2, 100.0, false).await.unwrap();

        let result = fleet.wait_until_drained(2, Duration::from_secs(3)).await;
        assert!(matches!(result, Err(FleetError::DrainTimeout { timeout_secs: 3 })));
        assert!(clock.elapsed() >= Duration::from_secs(3));
        assert!(clock.elapsed() < Duration::from_secs(4));
    }
}
