//! # memfleet-core
//!
//! Core types, errors, and utilities shared by the memfleet crates.
//!
//! This crate provides:
//! - [`FleetError`] - Error type for every fleet operation
//! - [`logging`] - Tracing setup and log management utilities
//! - [`types`] - Coverage records, snapshots and screen geometry
//! - [`cell`] - The guarded cell that holds the aggregate total
//! - [`clock`] - Injectable time source for periodic tasks
//!
//! ## Example
//!
//! ```no_run
//! use memfleet_core::{FleetError, Result, logging};
//!
//! fn main() -> memfleet_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let worker = std::path::Path::new("./memtest");
//!     if !worker.exists() {
//!         return Err(FleetError::executable_not_found(worker));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cell;
pub mod clock;
pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use cell::GuardedCell;
pub use clock::{Clock, SteppedClock, SystemClock};
pub use error::{FleetError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{CoverageRecord, CoverageSnapshot, LayoutSettings, Location, WindowSize};
