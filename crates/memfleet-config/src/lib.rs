//! # memfleet-config
//!
//! Configuration for memfleet runs.
//!
//! - [`Settings`] - the persisted user settings (`~/.memfleet/config.yaml`)
//! - [`validate`] - turns settings plus system limits into a [`FleetConfig`]
//! - [`FleetConfig`] - the validated bundle the engine runs from
//! - [`system`] - RAM and CPU limits of the current machine
//!
//! ## Example
//!
//! ```no_run
//! use memfleet_config::{Settings, SystemMemory, system, validate};
//!
//! fn main() -> memfleet_core::Result<()> {
//!     let settings = Settings::load()?;
//!     let memory = SystemMemory::read()?;
//!     let validated = validate(&settings, &memory, system::thread_capacity())?;
//!
//!     for warning in &validated.warnings {
//!         println!("warning: {warning}");
//!     }
//!     println!(
//!         "{} workers, {:.0} MB each",
//!         validated.config.thread_count,
//!         validated.config.ram_share_mb()
//!     );
//!     Ok(())
//! }
//! ```

pub mod fleet;
pub mod settings;
pub mod system;
pub mod validate;

pub use fleet::FleetConfig;
pub use settings::{Settings, WorkerSettings};
pub use system::SystemMemory;
pub use validate::{Validated, ValidationWarning, default_rows, row_choices, validate};

/// Largest RAM share a single worker accepts, in MB.
pub const MAX_RAM_PER_WORKER_MB: u64 = 2048;

/// Default wait for workers to finish after a stop, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default executable name of the worker.
pub const DEFAULT_WORKER_EXECUTABLE: &str = "memtest";
