//! Integration tests for the fleet lifecycle.
//!
//! These tests cover the lifecycle scenarios:
//! - Start a fleet, lay it out and minimise it
//! - Graceful stop followed by drain
//! - Restarting replaces every handle
//! - Teardown after a partial start
//! - A real process worker writing its status file

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use memfleet_core::{CoverageSnapshot, LayoutSettings, SteppedClock, SystemClock};

    use crate::fleet::WorkerFleet;
    use crate::handle::WorkerHandle;
    use crate::layout;
    use crate::process::{ProcessConfig, ProcessWorkerProvider};
    use crate::testing::{ScriptedProvider, WorkerScript};

    fn scripted_fleet(provider: &Arc<ScriptedProvider>) -> WorkerFleet {
        WorkerFleet::new(provider.clone(), Arc::new(SteppedClock::new()), 16)
    }

    // =============================================================================
    // Start and Layout Tests
    // =============================================================================

    #[tokio::test]
    async fn test_start_layout_minimise_restore() {
        let provider = Arc::new(ScriptedProvider::new());
        let fleet = scripted_fleet(&provider);

        let report = fleet.start_all(6, 500.0, false).await.unwrap();
        assert!(report.all_started());

        let settings = LayoutSettings {
            rows: 3,
            x_offset: 100,
            y_offset: 50,
            x_spacing: 4,
            y_spacing: 2,
        };
        let plan = layout::plan(6, &settings, fleet.window_size()).unwrap();
        fleet.apply_layout(&plan).await;

        for index in 0..6 {
            let state = provider.worker(index).unwrap().state();
            assert_eq!(state.location, plan.location(index));
        }

        fleet.set_all_minimised(6, true).await;
        assert!((0..6).all(|i| provider.worker(i).unwrap().state().minimised));

        fleet.set_all_minimised(6, false).await;
        assert!((0..6).all(|i| !provider.worker(i).unwrap().state().minimised));
    }

    #[tokio::test]
    async fn test_start_minimised_is_recorded() {
        let provider = Arc::new(ScriptedProvider::new());
        let fleet = scripted_fleet(&provider);

        fleet.start_all(2, 500.0, true).await.unwrap();
        assert!(provider.worker(0).unwrap().state().minimised);
        assert!(provider.worker(1).unwrap().state().minimised);
    }

    // =============================================================================
    // Stop and Drain Tests
    // =============================================================================

    #[tokio::test]
    async fn test_graceful_stop_then_drain() {
        let provider = Arc::new(ScriptedProvider::new());
        for index in 0..4 {
            provider.script(index, WorkerScript::steady(50.0, 0).finish_on_stop());
        }
        let fleet = scripted_fleet(&provider);
        fleet.start_all(4, 500.0, false).await.unwrap();

        fleet.stop_all(4).await;
        fleet.wait_until_drained(4, Duration::from_secs(10)).await.unwrap();

        // Second stop has nothing left to stop
        fleet.stop_all(4).await;
        for index in 0..4 {
            assert_eq!(provider.worker(index).unwrap().stop_calls(), 1);
        }

        // Counters stay readable after the workers finished
        assert_eq!(fleet.snapshot(2).await.unwrap(), CoverageSnapshot::new(50.0, 0));
    }

    #[tokio::test]
    async fn test_stop_only_reaches_active_prefix() {
        let provider = Arc::new(ScriptedProvider::new());
        let fleet = scripted_fleet(&provider);
        fleet.start_all(4, 500.0, false).await.unwrap();

        fleet.stop_all(2).await;

        assert_eq!(provider.worker(0).unwrap().stop_calls(), 1);
        assert_eq!(provider.worker(1).unwrap().stop_calls(), 1);
        assert_eq!(provider.worker(2).unwrap().stop_calls(), 0);
        assert_eq!(provider.worker(3).unwrap().stop_calls(), 0);
    }

    // =============================================================================
    // Restart and Teardown Tests
    // =============================================================================

    #[tokio::test]
    async fn test_restart_replaces_handles() {
        let provider = Arc::new(ScriptedProvider::new());
        let fleet = scripted_fleet(&provider);

        fleet.start_all(4, 500.0, false).await.unwrap();
        let first = provider.worker(0).unwrap();
        fleet.close_all().await;

        fleet.start_all(2, 1000.0, false).await.unwrap();
        let second = provider.worker(0).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.ram_share_mb(), Some(1000.0));
        assert!(fleet.handle(2).await.is_none());
        assert_eq!(provider.kill_strays_calls(), 2);
    }

    #[tokio::test]
    async fn test_teardown_after_partial_start() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(1, WorkerScript::default().fail_launch("exited immediately"));
        let fleet = scripted_fleet(&provider);

        let report = fleet.start_all(3, 500.0, false).await.unwrap();
        assert_eq!(report.failed_indices(), vec![1]);

        fleet.close_all().await;
        for index in 0..3 {
            assert_eq!(provider.worker(index).unwrap().close_calls(), 1);
            assert!(fleet.handle(index).await.is_none());
        }
    }

    // =============================================================================
    // Process Worker Tests
    // =============================================================================

    #[tokio::test]
    #[ignore = "spawns a shell script as the worker"]
    async fn test_process_worker_reports_status_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-memtest");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '{\"coverage_percent\": 12.5, \"error_count\": 0}' > \"$MEMFLEET_STATUS_FILE\"\n\
             exec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ProcessConfig::new(&script, dir.path().join("status"))
            .with_manage_windows(false)
            .with_startup_grace(Duration::from_millis(300));
        let provider = Arc::new(ProcessWorkerProvider::new(config).unwrap());
        let fleet = WorkerFleet::new(provider, Arc::new(SystemClock), 4);

        let report = fleet.start_all(1, 64.0, false).await.unwrap();
        assert!(report.all_started());

        let handle = fleet.handle(0).await.unwrap();
        let mut snapshot = None;
        for _ in 0..20 {
            snapshot = handle.read_snapshot();
            if snapshot.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(snapshot, Some(CoverageSnapshot::new(12.5, 0)));

        fleet.stop_all(1).await;
        fleet.wait_until_drained(1, Duration::from_secs(5)).await.unwrap();
        fleet.close_all().await;
    }
}
