//! Worker types and data structures.
//!
//! This module defines the state tracked for every worker handle, the outcome
//! of a launch, and the per-fleet start report.

use chrono::{DateTime, Utc};
use memfleet_core::Location;
use serde::{Deserialize, Serialize};

/// Last-known state of one worker handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleState {
    /// 0-based ordinal, stable for the run
    pub index: usize,
    /// True only after the process was confirmed alive
    pub started: bool,
    /// True once the worker signalled completion or was terminated
    pub finished: bool,
    /// Last-applied window state
    pub minimised: bool,
    /// Last-applied window position
    pub location: Option<Location>,
    /// Set after the first terminate request
    pub stop_requested: bool,
    /// Process ID, when a process backs the handle
    pub pid: Option<u32>,
    /// When the worker was confirmed started
    pub started_at: Option<DateTime<Utc>>,
}

impl HandleState {
    /// Fresh state for a handle that has not been started.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            started: false,
            finished: false,
            minimised: false,
            location: None,
            stop_requested: false,
            pid: None,
            started_at: None,
        }
    }

    /// Record a confirmed start.
    pub fn mark_started(&mut self, pid: Option<u32>, minimised: bool) {
        self.started = true;
        self.finished = false;
        self.stop_requested = false;
        self.minimised = minimised;
        self.pid = pid;
        self.started_at = Some(Utc::now());
    }

    /// Whether a terminate request should be sent now.
    pub fn can_stop(&self) -> bool {
        self.started && !self.finished && !self.stop_requested
    }
}

/// Result of starting a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The process is alive
    Started,
    /// The process could not be spawned or exited right away
    FailedToLaunch { reason: String },
}

impl StartOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::FailedToLaunch {
            reason: reason.into(),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

/// A worker that failed to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchFailure {
    pub index: usize,
    pub reason: String,
}

/// Outcome of starting the whole fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Number of workers that were requested
    pub requested: usize,
    /// Indices of workers that started, ascending
    pub started: Vec<usize>,
    /// Workers that failed to launch, ascending by index
    pub failed: Vec<LaunchFailure>,
}

impl StartReport {
    /// Returns true if every requested worker started.
    pub fn all_started(&self) -> bool {
        self.failed.is_empty() && self.started.len() == self.requested
    }

    /// Indices of the workers that failed.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.index).collect()
    }
}
