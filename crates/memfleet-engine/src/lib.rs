//! # memfleet-engine
//!
//! Coverage aggregation and run orchestration for memfleet.
//!
//! This crate provides:
//! - [`Orchestrator`] - launch, stop and drain a fleet run
//! - [`CoverageAggregator`] - the poll loop and its stop policies
//! - [`CoverageBoard`] - the coverage table shared with presentation
//! - [`stats`] - throughput and ETA estimates
//! - [`StopSwitch`] - the one-shot stop signal of a run
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use memfleet_config::FleetConfig;
//! use memfleet_core::SystemClock;
//! use memfleet_engine::Orchestrator;
//! use memfleet_worker::{ProcessConfig, ProcessWorkerProvider, WorkerFleet};
//!
//! #[tokio::main]
//! async fn main() -> memfleet_core::Result<()> {
//!     let provider = ProcessWorkerProvider::new(ProcessConfig::new("memtest", "/tmp/memfleet"))?;
//!     let fleet = WorkerFleet::new(Arc::new(provider), Arc::new(SystemClock), 16);
//!     let orchestrator = Orchestrator::new(Arc::new(fleet));
//!
//!     let config = FleetConfig::new(8, 16_000).with_stop_at(400);
//!     orchestrator.launch(&config).await?;
//!
//!     let reason = orchestrator.stopped().await?;
//!     let report = orchestrator.await_shutdown(config.timeout()).await?;
//!     println!("{reason}: {}", report.final_total);
//!
//!     orchestrator.close_all().await;
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod board;
pub mod orchestrator;
pub mod stats;
pub mod stop;

// Re-export main types for convenience
pub use aggregator::{CoverageAggregator, PollPolicy, PollState, PollSummary, TickOutcome};
pub use board::CoverageBoard;
pub use orchestrator::{Orchestrator, ShutdownOutcome, ShutdownReport};
pub use stats::{Estimate, ProgressReport, estimate, format_hms};
pub use stop::{StopReason, StopSwitch};
