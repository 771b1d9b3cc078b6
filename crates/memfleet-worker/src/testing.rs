//! Scripted worker double for tests.
//!
//! [`ScriptedWorker`] never spawns a process. Its snapshots come from a
//! script, and it records every command it receives so tests can assert on
//! them. Enable the `test-support` feature to use it from other crates.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use memfleet_core::{CoverageSnapshot, FleetError, Location, Result, WindowSize};

use crate::handle::{WorkerHandle, WorkerProvider};
use crate::types::{HandleState, StartOutcome};

/// Behaviour of one scripted worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerScript {
    /// Snapshots returned by successive reads; `None` entries are unreadable
    pub reads: Vec<Option<CoverageSnapshot>>,
    /// Returned once `reads` is exhausted
    pub steady: Option<CoverageSnapshot>,
    pub launch_failure: Option<String>,
    pub close_fails: bool,
    pub finish_on_stop: bool,
}

impl WorkerScript {
    /// A worker that always reports the same counters.
    pub fn steady(coverage_percent: f64, error_count: u64) -> Self {
        Self {
            steady: Some(CoverageSnapshot::new(coverage_percent, error_count)),
            ..Self::default()
        }
    }

    pub fn then_read(mut self, snapshot: Option<CoverageSnapshot>) -> Self {
        self.reads.push(snapshot);
        self
    }

    pub fn fail_launch(mut self, reason: impl Into<String>) -> Self {
        self.launch_failure = Some(reason.into());
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.close_fails = true;
        self
    }

    pub fn finish_on_stop(mut self) -> Self {
        self.finish_on_stop = true;
        self
    }
}

/// A worker handle driven by a [`WorkerScript`].
#[derive(Debug)]
pub struct ScriptedWorker {
    index: usize,
    state: Mutex<HandleState>,
    reads: Mutex<VecDeque<Option<CoverageSnapshot>>>,
    steady: Mutex<Option<CoverageSnapshot>>,
    ram_share_mb: Mutex<Option<f64>>,
    launch_failure: Option<String>,
    close_fails: bool,
    finish_on_stop: bool,
    stop_calls: AtomicUsize,
    close_calls: AtomicUsize,
    dismiss_calls: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(index: usize, script: WorkerScript) -> Self {
        Self {
            index,
            state: Mutex::new(HandleState::new(index)),
            reads: Mutex::new(script.reads.into()),
            steady: Mutex::new(script.steady),
            ram_share_mb: Mutex::new(None),
            launch_failure: script.launch_failure,
            close_fails: script.close_fails,
            finish_on_stop: script.finish_on_stop,
            stop_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            dismiss_calls: AtomicUsize::new(0),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the counters returned once the scripted reads run out.
    pub fn set_snapshot(&self, snapshot: Option<CoverageSnapshot>) {
        *self.steady.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Mark the worker as having completed its run.
    pub fn finish(&self) {
        self.lock_state().finished = true;
    }

    /// RAM share passed to the last `start`.
    pub fn ram_share_mb(&self) -> Option<f64> {
        *self.ram_share_mb.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of `stop` calls that reached a running worker.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn dismiss_calls(&self) -> usize {
        self.dismiss_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerHandle for ScriptedWorker {
    fn index(&self) -> usize {
        self.index
    }

    async fn start(&self, ram_share_mb: f64, start_minimised: bool) -> StartOutcome {
        *self.ram_share_mb.lock().unwrap_or_else(PoisonError::into_inner) = Some(ram_share_mb);
        if let Some(reason) = &self.launch_failure {
            return StartOutcome::failed(reason.clone());
        }
        self.lock_state().mark_started(None, start_minimised);
        StartOutcome::Started
    }

    async fn stop(&self) {
        let mut state = self.lock_state();
        if !state.started || state.finished {
            return;
        }
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        state.stop_requested = true;
        if self.finish_on_stop {
            state.finished = true;
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(FleetError::close_failure(self.index, "scripted close failure"));
        }
        self.lock_state().finished = true;
        Ok(())
    }

    async fn set_minimised(&self, minimised: bool) {
        let mut state = self.lock_state();
        if state.started {
            state.minimised = minimised;
        }
    }

    async fn set_location(&self, location: Location) {
        let mut state = self.lock_state();
        if state.started {
            state.location = Some(location);
        }
    }

    fn read_snapshot(&self) -> Option<CoverageSnapshot> {
        let next = self
            .reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(read) => read,
            None => *self.steady.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn is_started(&self) -> bool {
        self.lock_state().started
    }

    fn is_finished(&self) -> bool {
        self.lock_state().finished
    }

    fn state(&self) -> HandleState {
        self.lock_state().clone()
    }

    async fn dismiss_error_notice(&self) {
        self.dismiss_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider handing out [`ScriptedWorker`]s.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<usize, WorkerScript>>,
    workers: Mutex<HashMap<usize, Arc<ScriptedWorker>>>,
    kill_strays_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the worker created for slot `index`.
    pub fn script(&self, index: usize, script: WorkerScript) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, script);
    }

    /// The most recent worker created for slot `index`.
    pub fn worker(&self, index: usize) -> Option<Arc<ScriptedWorker>> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .cloned()
    }

    pub fn kill_strays_calls(&self) -> usize {
        self.kill_strays_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerProvider for ScriptedProvider {
    fn create(&self, index: usize) -> Arc<dyn WorkerHandle> {
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .cloned()
            .unwrap_or_default();
        let worker = Arc::new(ScriptedWorker::new(index, script));
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Arc::clone(&worker));
        worker
    }

    async fn kill_strays(&self) -> Result<()> {
        self.kill_strays_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn window_size(&self) -> WindowSize {
        WindowSize::new(217, 247)
    }
}
