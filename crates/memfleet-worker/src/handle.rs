//! Capability interface over one worker and the factory that creates them.
//!
//! The fleet only talks to workers through [`WorkerHandle`]. The shipped
//! adapter is [`crate::process::ProcessWorker`]; tests use the scripted double
//! in `testing`.

use std::sync::Arc;

use async_trait::async_trait;
use memfleet_core::{CoverageSnapshot, Location, Result, WindowSize};

use crate::types::{HandleState, StartOutcome};

/// One external worker process.
///
/// Every method takes `&self`; implementations keep their state behind
/// interior mutability so handles can be shared with fan-out tasks.
#[async_trait]
pub trait WorkerHandle: Send + Sync + std::fmt::Debug {
    /// 0-based index of the handle in the fleet.
    fn index(&self) -> usize;

    /// Launch the worker with a RAM share in MB.
    ///
    /// A worker that cannot be spawned or exits immediately yields
    /// [`StartOutcome::FailedToLaunch`]; this never returns an error.
    async fn start(&self, ram_share_mb: f64, start_minimised: bool) -> StartOutcome;

    /// Ask the worker to terminate gracefully.
    ///
    /// Idempotent, and returns once the request is sent.
    async fn stop(&self);

    /// Forcefully terminate the worker process.
    async fn close(&self) -> Result<()>;

    /// Minimise or restore the worker window. No-op unless started.
    async fn set_minimised(&self, minimised: bool);

    /// Move the worker window. No-op unless started.
    async fn set_location(&self, location: Location);

    /// Best-effort read of the displayed counters.
    ///
    /// Never blocks; `None` when the counters cannot be read right now.
    fn read_snapshot(&self) -> Option<CoverageSnapshot>;

    fn is_started(&self) -> bool;

    fn is_finished(&self) -> bool;

    /// Copy of the last-known state.
    fn state(&self) -> HandleState;

    /// Dismiss the error notice a worker shows after finding an error.
    async fn dismiss_error_notice(&self) {}
}

/// Creates handles for fleet slots and cleans up leftover workers.
#[async_trait]
pub trait WorkerProvider: Send + Sync + std::fmt::Debug {
    /// Create an unstarted handle for slot `index`.
    fn create(&self, index: usize) -> Arc<dyn WorkerHandle>;

    /// Force-close every worker process on the system, including ones this
    /// program did not start.
    async fn kill_strays(&self) -> Result<()>;

    /// Fixed size of a worker window.
    fn window_size(&self) -> WindowSize;
}
