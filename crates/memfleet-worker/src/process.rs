//! Process-backed worker handles.
//!
//! Each [`ProcessWorker`] owns one `tokio::process::Child` running the worker
//! executable. The worker is launched as
//!
//! ```text
//! <executable> --ram-mb <share>
//! ```
//!
//! with these environment variables:
//! - `MEMFLEET_WORKER_INDEX`: 0-based index of the worker
//! - `MEMFLEET_STATUS_FILE`: where the worker writes its counters
//!
//! Graceful stops send `SIGTERM` through `kill`; teardown kills the child.
//! Windows are managed through [`crate::xdo`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use memfleet_core::{CoverageSnapshot, FleetError, Location, Result, WindowSize, log_worker_event};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use crate::display::{DisplayReader, StatusFileReader};
use crate::handle::{WorkerHandle, WorkerProvider};
use crate::types::{HandleState, StartOutcome};
use crate::xdo;

/// Interval between window lookups while a worker is starting.
const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Title of the notice a worker shows after finding an error.
pub const ERROR_NOTICE_TITLE: &str = "MemTest Error";

/// How process workers are launched and observed.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Worker executable
    pub executable: PathBuf,
    /// Directory of the per-worker status files
    pub status_dir: PathBuf,
    /// Fixed window size of a worker
    pub window: WindowSize,
    /// Move and minimise windows with xdotool
    pub manage_windows: bool,
    /// A worker still alive after this long counts as started
    pub startup_grace: Duration,
    /// How long a started worker may take to map its window
    pub window_wait: Duration,
}

impl ProcessConfig {
    pub fn new(executable: impl Into<PathBuf>, status_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            status_dir: status_dir.into(),
            window: WindowSize::new(217, 247),
            manage_windows: true,
            startup_grace: Duration::from_millis(250),
            window_wait: Duration::from_secs(5),
        }
    }

    pub fn with_window(mut self, window: WindowSize) -> Self {
        self.window = window;
        self
    }

    pub fn with_manage_windows(mut self, manage_windows: bool) -> Self {
        self.manage_windows = manage_windows;
        self
    }

    pub fn with_startup_grace(mut self, startup_grace: Duration) -> Self {
        self.startup_grace = startup_grace;
        self
    }

    pub fn with_window_wait(mut self, window_wait: Duration) -> Self {
        self.window_wait = window_wait;
        self
    }

    /// Process name the executable runs under, as matched by `pkill -x`.
    pub fn process_name(&self) -> Option<String> {
        self.executable
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// A worker backed by a child process.
#[derive(Debug)]
pub struct ProcessWorker {
    index: usize,
    config: Arc<ProcessConfig>,
    reader: Arc<StatusFileReader>,
    state: Mutex<HandleState>,
    child: Mutex<Option<Child>>,
    window: Mutex<Option<String>>,
}

impl ProcessWorker {
    pub fn new(index: usize, config: Arc<ProcessConfig>, reader: Arc<StatusFileReader>) -> Self {
        Self {
            index,
            config,
            reader,
            state: Mutex::new(HandleState::new(index)),
            child: Mutex::new(None),
            window: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the child process has exited (or was never spawned).
    fn has_exited(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    fn spawn(&self, ram_share_mb: f64, status_file: &Path) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.config.executable);
        cmd.arg("--ram-mb")
            .arg(format!("{ram_share_mb:.2}"))
            .env("MEMFLEET_WORKER_INDEX", self.index.to_string())
            .env("MEMFLEET_STATUS_FILE", status_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd.spawn()
    }

    fn cache_window(&self, window: &str) {
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = Some(window.to_string());
    }

    /// Wait for a freshly started worker to map its window.
    async fn await_window(&self, pid: u32) {
        match xdo::wait_for_window(pid, self.config.window_wait, WINDOW_POLL_INTERVAL).await {
            Ok(Some(window)) => self.cache_window(&window),
            Ok(None) => warn!(
                worker = self.index,
                pid,
                wait_ms = self.config.window_wait.as_millis() as u64,
                "worker window did not appear"
            ),
            Err(e) => warn!(worker = self.index, error = %e, "window lookup failed"),
        }
    }

    /// Window of this worker, looked up once and then cached.
    async fn window(&self) -> Option<String> {
        if !self.config.manage_windows {
            return None;
        }

        let cached = self
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if cached.is_some() {
            return cached;
        }

        let pid = self.lock_state().pid?;
        match xdo::find_window(pid).await {
            Ok(Some(window)) => {
                self.cache_window(&window);
                Some(window)
            }
            Ok(None) => {
                debug!(worker = self.index, pid, "no window found yet");
                None
            }
            Err(e) => {
                warn!(worker = self.index, error = %e, "window lookup failed");
                None
            }
        }
    }

    /// Minimise or restore the window; true when the change was applied.
    async fn apply_minimised(&self, minimised: bool) -> bool {
        let Some(window) = self.window().await else {
            return false;
        };
        let result = if minimised {
            xdo::minimise(&window).await
        } else {
            xdo::activate(&window).await
        };
        match result {
            Ok(()) => {
                self.lock_state().minimised = minimised;
                true
            }
            Err(e) => {
                warn!(worker = self.index, error = %e, "failed to change window state");
                false
            }
        }
    }
}

#[async_trait]
impl WorkerHandle for ProcessWorker {
    fn index(&self) -> usize {
        self.index
    }

    #[instrument(level = "debug", skip(self), fields(worker = self.index))]
    async fn start(&self, ram_share_mb: f64, start_minimised: bool) -> StartOutcome {
        let status_file = self.reader.path_for(self.index);
        // Counters of a previous run must not be read as this run's
        if let Err(e) = std::fs::remove_file(&status_file)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(worker = self.index, error = %e, "failed to remove stale status file");
        }

        let mut child = match self.spawn(ram_share_mb, &status_file) {
            Ok(child) => child,
            Err(e) => {
                let error = if e.kind() == std::io::ErrorKind::NotFound {
                    FleetError::executable_not_found(&self.config.executable)
                } else {
                    FleetError::worker_launch(self.index, e.to_string())
                };
                let reason = error.to_string();
                log_worker_event!(self.index, "launch_failed", reason = %reason);
                return StartOutcome::failed(reason);
            }
        };

        tokio::time::sleep(self.config.startup_grace).await;

        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let reason = format!("exited immediately ({status})");
                log_worker_event!(self.index, "launch_failed", reason = %reason);
                return StartOutcome::failed(reason);
            }
            Err(e) => {
                let reason = format!("failed to check process: {e}");
                log_worker_event!(self.index, "launch_failed", reason = %reason);
                return StartOutcome::failed(reason);
            }
        }

        let pid = child.id();
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        self.lock_state().mark_started(pid, false);
        log_worker_event!(self.index, "started", pid = ?pid, ram_share_mb);

        if self.config.manage_windows
            && let Some(pid) = pid
        {
            self.await_window(pid).await;
        }
        if start_minimised {
            self.apply_minimised(true).await;
        }

        StartOutcome::Started
    }

    async fn stop(&self) {
        let pid = {
            let mut state = self.lock_state();
            if !state.can_stop() {
                return;
            }
            state.stop_requested = true;
            state.pid
        };

        let Some(pid) = pid else {
            return;
        };

        match Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                log_worker_event!(self.index, "stop_requested", pid);
            }
            Ok(output) => {
                // The process may already be gone
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!(worker = self.index, pid, "kill -TERM failed: {}", stderr.trim());
            }
            Err(e) => warn!(worker = self.index, pid, error = %e, "failed to run kill"),
        }
    }

    async fn close(&self) -> Result<()> {
        let child = self.child.lock().unwrap_or_else(PoisonError::into_inner).take();

        if let Some(mut child) = child {
            child
                .kill()
                .await
                .map_err(|e| FleetError::close_failure(self.index, e.to_string()))?;
            log_worker_event!(self.index, "closed");
        }

        let mut state = self.lock_state();
        state.finished = true;
        Ok(())
    }

    async fn set_minimised(&self, minimised: bool) {
        if !self.is_started() {
            return;
        }
        self.apply_minimised(minimised).await;
    }

    async fn set_location(&self, location: Location) {
        if !self.is_started() {
            return;
        }
        let Some(window) = self.window().await else {
            return;
        };
        match xdo::move_window(&window, location).await {
            Ok(()) => self.lock_state().location = Some(location),
            Err(e) => warn!(worker = self.index, error = %e, "failed to move window"),
        }
    }

    fn read_snapshot(&self) -> Option<CoverageSnapshot> {
        self.reader.read(self.index).map(|display| display.snapshot())
    }

    fn is_started(&self) -> bool {
        self.lock_state().started
    }

    fn is_finished(&self) -> bool {
        let finished = {
            let state = self.lock_state();
            if !state.started {
                return false;
            }
            state.finished
        };
        if finished {
            return true;
        }

        let done = self.has_exited()
            || self
                .reader
                .read(self.index)
                .is_some_and(|display| display.finished);
        if done {
            self.lock_state().finished = true;
            log_worker_event!(self.index, "finished");
        }
        done
    }

    fn state(&self) -> HandleState {
        self.lock_state().clone()
    }

    async fn dismiss_error_notice(&self) {
        if !self.config.manage_windows {
            return;
        }
        match xdo::find_windows_by_name(ERROR_NOTICE_TITLE).await {
            Ok(windows) => {
                for window in windows {
                    if let Err(e) = xdo::send_key(&window, "Return").await {
                        debug!(worker = self.index, error = %e, "failed to dismiss error notice");
                    }
                }
            }
            Err(e) => debug!(worker = self.index, error = %e, "error notice lookup failed"),
        }
    }
}

/// Creates [`ProcessWorker`]s that share one config and status reader.
#[derive(Debug, Clone)]
pub struct ProcessWorkerProvider {
    config: Arc<ProcessConfig>,
    reader: Arc<StatusFileReader>,
}

impl ProcessWorkerProvider {
    /// Create a provider, making sure the status directory exists.
    pub fn new(config: ProcessConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.status_dir).map_err(|e| FleetError::DirectoryCreation {
            path: config.status_dir.clone(),
            source: e,
        })?;
        let reader = Arc::new(StatusFileReader::new(&config.status_dir));
        Ok(Self {
            config: Arc::new(config),
            reader,
        })
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }
}

#[async_trait]
impl WorkerProvider for ProcessWorkerProvider {
    fn create(&self, index: usize) -> Arc<dyn WorkerHandle> {
        Arc::new(ProcessWorker::new(
            index,
            Arc::clone(&self.config),
            Arc::clone(&self.reader),
        ))
    }

    #[instrument(level = "debug", skip(self))]
    async fn kill_strays(&self) -> Result<()> {
        let Some(name) = self.config.process_name() else {
            return Ok(());
        };

        let output = Command::new("pkill")
            .args(["-KILL", "-x", &name])
            .output()
            .await
            .map_err(|e| FleetError::internal(format!("failed to run pkill: {e}")))?;

        // pkill exits 1 when no process matched
        match output.status.code() {
            Some(0) => debug!("Killed leftover {} processes", name),
            Some(1) => debug!("No leftover {} processes", name),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(FleetError::internal(format!(
                    "pkill {name} failed: {}",
                    stderr.trim()
                )));
            }
        }
        Ok(())
    }

    fn window_size(&self) -> WindowSize {
        self.config.window
    }
}
