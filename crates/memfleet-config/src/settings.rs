//! Persisted user settings.
//!
//! Settings live in `~/.memfleet/config.yaml`. Every field has a default, so a
//! missing file or a file with only some keys still loads. Values here are
//! raw user input; [`crate::validate`] turns them into a [`crate::FleetConfig`].
//!
//! ```yaml
//! ram: 16000
//! threads: 8
//! rows: 2
//! x_offset: 40
//! y_offset: 40
//! stop_at: true
//! stop_at_value: 400
//! stop_on_error: true
//! timeout: 300
//! worker:
//!   executable: ./memtest
//! ```

use std::path::{Path, PathBuf};

use memfleet_core::{FleetError, Result, WindowSize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::DEFAULT_WORKER_EXECUTABLE;

/// Settings file path (`~/.memfleet/config.yaml`).
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".memfleet").join("config.yaml"))
}

/// User settings as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Total RAM to test in MB; `None` means "all currently available RAM"
    pub ram: Option<u64>,
    /// Number of workers; `None` means one per logical CPU
    pub threads: Option<usize>,
    pub x_offset: i32,
    pub y_offset: i32,
    pub x_spacing: i32,
    pub y_spacing: i32,
    /// Rows of the window grid; `None` picks the default for the thread count
    pub rows: Option<usize>,
    /// Whether the per-worker coverage limit is armed
    pub stop_at: bool,
    /// Coverage limit in percent
    pub stop_at_value: Option<u32>,
    pub stop_on_error: bool,
    pub start_minimised: bool,
    pub verbose: bool,
    /// Drain timeout in seconds
    pub timeout: Option<u64>,
    pub worker: WorkerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ram: None,
            threads: None,
            x_offset: 0,
            y_offset: 0,
            x_spacing: 0,
            y_spacing: 0,
            rows: None,
            stop_at: false,
            stop_at_value: None,
            stop_on_error: true,
            start_minimised: false,
            verbose: false,
            timeout: None,
            worker: WorkerSettings::default(),
        }
    }
}

/// How to launch and observe the worker executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the worker executable
    pub executable: PathBuf,
    /// Directory where workers write their status files
    pub status_dir: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    /// Move and minimise worker windows with xdotool
    pub manage_windows: bool,
    /// How long a worker must stay alive after spawn to count as started
    pub startup_grace_ms: u64,
    /// How long to wait for a started worker to map its window
    pub window_wait_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_WORKER_EXECUTABLE),
            status_dir: None,
            window_width: 217,
            window_height: 247,
            manage_windows: true,
            startup_grace_ms: 250,
            window_wait_ms: 5000,
        }
    }
}

impl WorkerSettings {
    pub fn window_size(&self) -> WindowSize {
        WindowSize::new(self.window_width, self.window_height)
    }
}

impl Settings {
    /// Load settings from the default path (`~/.memfleet/config.yaml`).
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from a specific path.
    ///
    /// A missing file yields the defaults. Malformed YAML is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Settings file does not exist: {:?}", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| FleetError::io("reading settings", path, e))?;
        Self::parse(&content).map_err(|message| FleetError::ConfigInvalid {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse settings from a YAML string.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        let path = config_path()
            .ok_or_else(|| FleetError::internal("home directory could not be determined"))?;
        self.save_to(&path)
    }

    /// Save settings to a specific path, atomically.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FleetError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let yaml = serde_yaml::to_string(self).map_err(|e| FleetError::ConfigInvalid {
            path: path.to_path_buf(),
            message: format!("Failed to serialize settings: {}", e),
        })?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, yaml)
            .map_err(|e| FleetError::io("writing settings", &temp_path, e))?;
        std::fs::rename(&temp_path, path)
            .map_err(|e| FleetError::io("replacing settings", path, e))?;

        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// The coverage limit, if the stop-at policy is armed.
    pub fn stop_at_percent(&self) -> Option<u32> {
        if self.stop_at { self.stop_at_value } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.ram, None);
        assert!(settings.stop_on_error);
        assert!(!settings.stop_at);
        assert_eq!(settings.worker.executable, PathBuf::from("memtest"));
        assert_eq!(settings.worker.window_size(), WindowSize::new(217, 247));
    }

    #[test]
    fn test_parse_partial_yaml() {
        let settings =
            Settings::parse("threads: 6\nrows: 3\nstop_at: true\nstop_at_value: 150\n").unwrap();
        assert_eq!(settings.threads, Some(6));
        assert_eq!(settings.rows, Some(3));
        assert_eq!(settings.stop_at_percent(), Some(150));
        assert_eq!(settings.x_offset, 0);
        assert!(settings.worker.manage_windows);
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
        assert_eq!(Settings::parse("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_stop_at_disarmed_ignores_value() {
        let settings = Settings {
            stop_at: false,
            stop_at_value: Some(200),
            ..Settings::default()
        };
        assert_eq!(settings.stop_at_percent(), None);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "threads: [not, a, number]\n").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, FleetError::ConfigInvalid { .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let settings = Settings {
            ram: Some(12_000),
            threads: Some(8),
            rows: Some(2),
            x_offset: 15,
            timeout: Some(120),
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();

        assert!(!path.with_extension("yaml.tmp").exists());
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }
}
