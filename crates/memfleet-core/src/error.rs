//! Error types for memfleet operations.
//!
//! This module defines [`FleetError`], the error enum shared by every memfleet
//! crate. Failures that affect the whole fleet (start, stop, drain) surface to
//! the caller; failures confined to one poll tick or one handle's teardown are
//! absorbed and logged by the component that sees them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`FleetError`].
pub type Result<T> = std::result::Result<T, FleetError>;

/// Error type for all memfleet operations.
#[derive(Debug, Error)]
pub enum FleetError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Settings file is not valid YAML for the expected schema
    #[error("Invalid settings at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Settings failed validation
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// Row count does not tile the fleet
    #[error("Cannot lay out {thread_count} workers in {rows} rows")]
    InvalidLayout { thread_count: usize, rows: usize },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// System information could not be read
    #[error("Failed to read system information: {message}")]
    SystemInfo { message: String },

    // =========================================================================
    // Worker Errors
    // =========================================================================
    /// Worker executable does not exist
    #[error("Worker executable not found: {path}")]
    ExecutableNotFound { path: PathBuf },

    /// A single worker failed to launch
    #[error("Failed to launch worker #{index}: {message}")]
    WorkerLaunch { index: usize, message: String },

    /// One or more workers failed to start; the whole start was aborted
    #[error("Failed to start workers {failed:?} ({started} of {requested} started)")]
    StartFailure {
        requested: usize,
        started: usize,
        failed: Vec<usize>,
    },

    /// A worker's counters could not be read this tick
    #[error("Worker #{index} snapshot unavailable")]
    UnreadableSnapshot { index: usize },

    /// A worker could not be force-closed during teardown
    #[error("Failed to close worker #{index}: {message}")]
    CloseFailure { index: usize, message: String },

    /// Workers did not all finish within the drain timeout
    #[error("Timed out after {timeout_secs}s waiting for all workers to finish")]
    DrainTimeout { timeout_secs: u64 },

    /// A window management command failed
    #[error("Window command '{command}' failed: {message}")]
    WindowCommand { command: String, message: String },

    /// Requested thread count exceeds the fleet capacity
    #[error("Requested {requested} workers but fleet capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    // =========================================================================
    // Run State Errors
    // =========================================================================
    /// A run is already in progress
    #[error("Workers are already running")]
    AlreadyRunning,

    /// No run is in progress
    #[error("No workers are running")]
    NotRunning,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in memfleet)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FleetError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a ConfigValidation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an ExecutableNotFound error
    pub fn executable_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ExecutableNotFound { path: path.into() }
    }

    /// Create a worker launch error
    pub fn worker_launch(index: usize, message: impl Into<String>) -> Self {
        Self::WorkerLaunch {
            index,
            message: message.into(),
        }
    }

    /// Create a close failure
    pub fn close_failure(index: usize, message: impl Into<String>) -> Self {
        Self::CloseFailure {
            index,
            message: message.into(),
        }
    }

    /// Create a window command error
    pub fn window_command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WindowCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidLayout error
    pub fn invalid_layout(thread_count: usize, rows: usize) -> Self {
        Self::InvalidLayout { thread_count, rows }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if this error is transient (the next tick or attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnreadableSnapshot { .. }
                | Self::DrainTimeout { .. }
                | Self::CloseFailure { .. }
                | Self::WindowCommand { .. }
        )
    }

    /// Returns true if this error should end the program
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::ConfigValidation { .. }
                | Self::InvalidLayout { .. }
                | Self::CapacityExceeded { .. }
        )
    }

    /// Returns true if this is a worker-related error
    pub fn is_worker_error(&self) -> bool {
        matches!(
            self,
            Self::ExecutableNotFound { .. }
                | Self::WorkerLaunch { .. }
                | Self::StartFailure { .. }
                | Self::UnreadableSnapshot { .. }
                | Self::CloseFailure { .. }
                | Self::DrainTimeout { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ExecutableNotFound { .. } => {
                Some("Place the worker executable next to memfleet or pass --worker")
            }
            Self::ConfigInvalid { .. } => {
                Some("Fix the YAML in ~/.memfleet/config.yaml or delete it to restore defaults")
            }
            Self::InvalidLayout { .. } => {
                Some("Run 'memfleet rows --threads N' to list valid row counts")
            }
            Self::StartFailure { .. } => Some("Check the log for the launch error of each worker"),
            Self::DrainTimeout { .. } => {
                Some("Check if any worker is still running and raise --timeout if they need longer")
            }
            Self::CapacityExceeded { .. } => Some("Use at most 4 workers per logical CPU"),
            Self::WindowCommand { .. } => {
                Some("Install xdotool or set worker.manage_windows to false in the settings")
            }
            _ => None,
        }
    }
}
