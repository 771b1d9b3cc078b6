//! Reading the counters a worker displays.
//!
//! Workers expose no IPC channel, so the counters are scraped. The shipped
//! [`StatusFileReader`] reads the JSON status file each worker rewrites while
//! it runs:
//!
//! ```json
//! { "coverage_percent": 153.2, "error_count": 0, "finished": false }
//! ```

use std::path::{Path, PathBuf};

use memfleet_core::CoverageSnapshot;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Counters shown by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerDisplay {
    pub coverage_percent: f64,
    pub error_count: u64,
    /// The worker completed its run
    #[serde(default)]
    pub finished: bool,
}

impl WorkerDisplay {
    pub fn snapshot(&self) -> CoverageSnapshot {
        CoverageSnapshot::new(self.coverage_percent, self.error_count)
    }
}

/// Source of a worker's displayed counters.
pub trait DisplayReader: Send + Sync + std::fmt::Debug {
    /// Read the counters of worker `index`; `None` when unavailable.
    fn read(&self, index: usize) -> Option<WorkerDisplay>;
}

/// Reads `worker-<index>.json` files from a status directory.
#[derive(Debug, Clone)]
pub struct StatusFileReader {
    dir: PathBuf,
}

impl StatusFileReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Status file path of worker `index`.
    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("worker-{index}.json"))
    }
}

impl DisplayReader for StatusFileReader {
    fn read(&self, index: usize) -> Option<WorkerDisplay> {
        let path = self.path_for(index);
        let content = std::fs::read_to_string(&path).ok()?;

        // A worker may be halfway through rewriting the file
        match serde_json::from_str::<WorkerDisplay>(&content) {
            Ok(display)
                if display.coverage_percent.is_finite() && display.coverage_percent >= 0.0 =>
            {
                Some(display)
            }
            Ok(bad) => {
                trace!(worker = index, coverage = bad.coverage_percent, "ignoring bad coverage");
                None
            }
            Err(e) => {
                trace!(worker = index, error = %e, "status file not parseable");
                None
            }
        }
    }
}
