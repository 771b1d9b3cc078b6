//! Shared type definitions used across memfleet crates.

use serde::{Deserialize, Serialize};

/// Label of the aggregate total row.
pub const TOTAL_LABEL: &str = "T";

/// Screen position of a worker window, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Fixed size of a worker window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Grid placement settings for worker windows.
///
/// `rows` must divide the active worker count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSettings {
    pub rows: usize,
    #[serde(default)]
    pub x_offset: i32,
    #[serde(default)]
    pub y_offset: i32,
    #[serde(default)]
    pub x_spacing: i32,
    #[serde(default)]
    pub y_spacing: i32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            rows: 1,
            x_offset: 0,
            y_offset: 0,
            x_spacing: 0,
            y_spacing: 0,
        }
    }
}

/// One best-effort read of a worker's displayed counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    /// Self-reported coverage of the worker's test pass, in percent
    pub coverage_percent: f64,
    /// Errors the worker has found so far
    pub error_count: u64,
}

impl CoverageSnapshot {
    pub fn new(coverage_percent: f64, error_count: u64) -> Self {
        Self {
            coverage_percent,
            error_count,
        }
    }
}

/// One row of the coverage table.
///
/// Row 0 is the aggregate total (label `"T"`); row `i` (1-based) belongs to
/// worker index `i - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub label: String,
    pub coverage_percent: f64,
    pub error_count: u64,
    /// Whether the row is part of the current fleet
    pub valid: bool,
    /// Set when the error policy flagged this worker
    #[serde(default)]
    pub errored: bool,
}

impl CoverageRecord {
    /// A zeroed record for worker `index` (0-based).
    pub fn worker(index: usize) -> Self {
        Self::labelled((index + 1).to_string())
    }

    /// A zeroed total record.
    pub fn total() -> Self {
        Self::labelled(TOTAL_LABEL)
    }

    fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            coverage_percent: 0.0,
            error_count: 0,
            valid: true,
            errored: false,
        }
    }

    /// Returns true if this is the aggregate total row.
    pub fn is_total(&self) -> bool {
        self.label == TOTAL_LABEL
    }

    /// Copy the counters of a snapshot into this record.
    pub fn apply(&mut self, snapshot: CoverageSnapshot) {
        self.coverage_percent = snapshot.coverage_percent;
        self.error_count = snapshot.error_count;
    }
}

impl std::fmt::Display for CoverageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>3} {:>8.1}% {:>6} errors",
            self.label, self.coverage_percent, self.error_count
        )
    }
}
