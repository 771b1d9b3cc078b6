//! Worker management for memfleet.
//!
//! This crate launches, positions, observes and terminates the external
//! stress-test workers.
//!
//! # Overview
//!
//! Workers are opaque processes with no IPC channel. This crate provides the
//! infrastructure to:
//!
//! - Launch workers with their RAM share and confirm they stayed alive
//! - Request graceful stops and force-close at teardown
//! - Tile worker windows on screen and minimise/restore them
//! - Read each worker's displayed counters on demand
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │     WorkerFleet      │
//! │ (fan-out, drain)     │
//! └──────────┬───────────┘
//!            │ Arc<dyn WorkerHandle>
//!            ▼
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │    ProcessWorker     │─────▶│      xdotool         │
//! │ (spawn, TERM, kill)  │      │ (move, minimise)     │
//! └──────────┬───────────┘      └──────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │  worker-N.json       │
//! │  (status file)       │
//! └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use memfleet_core::{LayoutSettings, SystemClock};
//! use memfleet_worker::{ProcessConfig, ProcessWorkerProvider, WorkerFleet, layout};
//!
//! #[tokio::main]
//! async fn main() -> memfleet_core::Result<()> {
//!     let config = ProcessConfig::new("./memtest", "/tmp/memfleet");
//!     let provider = ProcessWorkerProvider::new(config)?;
//!     let fleet = WorkerFleet::new(Arc::new(provider), Arc::new(SystemClock), 16);
//!
//!     let report = fleet.start_all(4, 2048.0, false).await?;
//!     if !report.all_started() {
//!         fleet.close_all().await;
//!         return Ok(());
//!     }
//!
//!     let settings = LayoutSettings { rows: 2, ..LayoutSettings::default() };
//!     let plan = layout::plan(4, &settings, fleet.window_size())?;
//!     fleet.apply_layout(&plan).await;
//!
//!     fleet.stop_all(4).await;
//!     fleet.close_all().await;
//!     Ok(())
//! }
//! ```

pub mod display;
pub mod fleet;
pub mod handle;
pub mod layout;
pub mod process;
pub mod types;
pub mod xdo;

mod lifecycle_tests;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export main types for convenience
pub use display::{DisplayReader, StatusFileReader, WorkerDisplay};
pub use fleet::WorkerFleet;
pub use handle::{WorkerHandle, WorkerProvider};
pub use layout::{LayoutPlan, centre_offsets, centred};
pub use process::{ProcessConfig, ProcessWorker, ProcessWorkerProvider};
pub use types::{HandleState, LaunchFailure, StartOutcome, StartReport};
