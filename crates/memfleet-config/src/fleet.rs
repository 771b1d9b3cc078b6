//! The validated configuration bundle a run is launched from.

use std::time::Duration;

use memfleet_core::{FleetError, LayoutSettings, Result};
use serde::{Deserialize, Serialize};

use crate::DEFAULT_TIMEOUT_SECS;

/// Validated configuration for one run of the fleet.
///
/// Produced by [`crate::validate`]. The engine still performs a cheap
/// [`FleetConfig::check`] before launching and refuses bundles that break the
/// invariants below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Number of workers, `> 0`
    pub thread_count: usize,
    /// RAM tested by the whole fleet in MB, `> 0`
    pub total_ram_mb: u64,
    /// Window grid; `layout.rows` divides `thread_count`
    pub layout: LayoutSettings,
    /// Per-worker coverage limit in percent, `> 0` when set
    pub stop_at_percent: Option<u32>,
    pub stop_on_error: bool,
    pub start_minimised: bool,
    pub verbose: bool,
    pub timeout_secs: u64,
}

impl FleetConfig {
    /// A bundle with the given size and defaults for everything else.
    pub fn new(thread_count: usize, total_ram_mb: u64) -> Self {
        Self {
            thread_count,
            total_ram_mb,
            layout: LayoutSettings::default(),
            stop_at_percent: None,
            stop_on_error: false,
            start_minimised: false,
            verbose: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_layout(mut self, layout: LayoutSettings) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_stop_at(mut self, percent: u32) -> Self {
        self.stop_at_percent = Some(percent);
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn with_start_minimised(mut self, start_minimised: bool) -> Self {
        self.start_minimised = start_minimised;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// RAM given to each worker, in MB.
    pub fn ram_share_mb(&self) -> f64 {
        if self.thread_count == 0 {
            return 0.0;
        }
        self.total_ram_mb as f64 / self.thread_count as f64
    }

    /// Drain timeout used when shutting down.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject bundles that break the invariants the engine relies on.
    pub fn check(&self, capacity: usize) -> Result<()> {
        if self.thread_count == 0 {
            return Err(FleetError::validation("thread count must be greater than 0"));
        }
        if self.thread_count > capacity {
            return Err(FleetError::CapacityExceeded {
                requested: self.thread_count,
                capacity,
            });
        }
        if self.total_ram_mb == 0 {
            return Err(FleetError::validation("amount of RAM must be greater than 0"));
        }
        if self.layout.rows == 0 || self.thread_count % self.layout.rows != 0 {
            return Err(FleetError::invalid_layout(self.thread_count, self.layout.rows));
        }
        if self.stop_at_percent == Some(0) {
            return Err(FleetError::validation("stop at (%) must be greater than 0"));
        }
        Ok(())
    }
}
