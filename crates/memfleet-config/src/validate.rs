//! Validation of user settings into a [`FleetConfig`].
//!
//! Hard limits produce [`FleetError::ConfigValidation`]. Conditions the user
//! may accept (testing more RAM than is currently free) come back as
//! [`ValidationWarning`]s next to the config.

use memfleet_core::{FleetError, LayoutSettings, Result};
use tracing::{info, warn};

use crate::fleet::FleetConfig;
use crate::settings::Settings;
use crate::system::{SystemMemory, logical_cpus};
use crate::{DEFAULT_TIMEOUT_SECS, MAX_RAM_PER_WORKER_MB};

/// A validated config plus the warnings raised while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub config: FleetConfig,
    pub warnings: Vec<ValidationWarning>,
}

impl Validated {
    /// Returns true if some warning needs the user's confirmation.
    pub fn needs_confirmation(&self) -> bool {
        self.warnings.iter().any(ValidationWarning::needs_confirmation)
    }
}

/// Non-fatal findings of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// No RAM amount was given, so all available RAM is used
    RamDefaulted { available_mb: u64 },
    /// The requested RAM exceeds what is free and will be paged out
    ExceedsAvailableRam { requested_mb: u64, available_mb: u64 },
    /// No timeout was given
    TimeoutDefaulted { timeout_secs: u64 },
}

impl ValidationWarning {
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::ExceedsAvailableRam { .. })
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RamDefaulted { available_mb } => {
                write!(f, "No RAM amount given, using free RAM ({available_mb} MB)")
            }
            Self::ExceedsAvailableRam {
                requested_mb,
                available_mb,
            } => write!(
                f,
                "Amount of RAM ({requested_mb} MB) exceeds available RAM ({available_mb} MB); \
                 it will be paged to storage, which may make workers really slow"
            ),
            Self::TimeoutDefaulted { timeout_secs } => {
                write!(f, "No timeout given, using {timeout_secs}s")
            }
        }
    }
}

/// Row counts that evenly tile `threads` workers (every divisor).
pub fn row_choices(threads: usize) -> Vec<usize> {
    (1..=threads).filter(|rows| threads % rows == 0).collect()
}

/// Default row count: 2 for an even thread count, otherwise 1.
pub fn default_rows(threads: usize) -> usize {
    if threads % 2 == 0 { 2 } else { 1 }
}

/// Validate raw settings against the machine's limits.
pub fn validate(settings: &Settings, memory: &SystemMemory, capacity: usize) -> Result<Validated> {
    let mut warnings = Vec::new();

    let threads = settings.threads.unwrap_or_else(|| logical_cpus().min(capacity));
    if threads == 0 {
        return Err(FleetError::validation("Number of threads must be greater than 0"));
    }
    if threads > capacity {
        return Err(FleetError::CapacityExceeded {
            requested: threads,
            capacity,
        });
    }

    let ram = match settings.ram {
        Some(ram) => ram,
        None => {
            warnings.push(ValidationWarning::RamDefaulted {
                available_mb: memory.available_mb,
            });
            memory.available_mb
        }
    };
    info!(threads, ram_mb = ram, available_mb = memory.available_mb, "validating input");

    if ram < threads as u64 {
        return Err(FleetError::validation(format!(
            "Amount of RAM must be at least {threads}"
        )));
    }

    let max_ram = MAX_RAM_PER_WORKER_MB * threads as u64;
    if ram > max_ram {
        return Err(FleetError::validation(format!(
            "Amount of RAM must be at most {max_ram}; \
             try increasing the number of threads or reducing amount of RAM"
        )));
    }

    if ram > memory.total_mb {
        return Err(FleetError::validation(format!(
            "Amount of RAM exceeds total RAM ({})",
            memory.total_mb
        )));
    }

    if ram > memory.available_mb {
        warn!(ram_mb = ram, available_mb = memory.available_mb, "RAM exceeds available RAM");
        warnings.push(ValidationWarning::ExceedsAvailableRam {
            requested_mb: ram,
            available_mb: memory.available_mb,
        });
    }

    let stop_at_percent = if settings.stop_at {
        match settings.stop_at_value {
            None => return Err(FleetError::validation("Please enter stop at (%)")),
            Some(0) => return Err(FleetError::validation("Stop at (%) must be greater than 0")),
            Some(value) => Some(value),
        }
    } else {
        None
    };

    let rows = settings.rows.unwrap_or_else(|| default_rows(threads));
    if rows == 0 || threads % rows != 0 {
        return Err(FleetError::invalid_layout(threads, rows));
    }

    let timeout_secs = match settings.timeout {
        Some(timeout) => timeout,
        None => {
            warnings.push(ValidationWarning::TimeoutDefaulted {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            });
            DEFAULT_TIMEOUT_SECS
        }
    };

    let config = FleetConfig {
        thread_count: threads,
        total_ram_mb: ram,
        layout: LayoutSettings {
            rows,
            x_offset: settings.x_offset,
            y_offset: settings.y_offset,
            x_spacing: settings.x_spacing,
            y_spacing: settings.y_spacing,
        },
        stop_at_percent,
        stop_on_error: settings.stop_on_error,
        start_minimised: settings.start_minimised,
        verbose: settings.verbose,
        timeout_secs,
    };

    Ok(Validated { config, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMORY: SystemMemory = SystemMemory {
        total_mb: 16_000,
        available_mb: 12_000,
    };

    fn settings(threads: usize, ram: u64) -> Settings {
        Settings {
            threads: Some(threads),
            ram: Some(ram),
            timeout: Some(60),
            ..Settings::default()
        }
    }

    #[test]
    fn test_row_choices_are_divisors() {
        assert_eq!(row_choices(12), vec![1, 2, 3, 4, 6, 12]);
        assert_eq!(row_choices(7), vec![1, 7]);
        assert_eq!(row_choices(1), vec![1]);
    }

    #[test]
    fn test_default_rows() {
        assert_eq!(default_rows(8), 2);
        assert_eq!(default_rows(7), 1);
    }

    #[test]
    fn test_valid_settings() {
        let validated = validate(&settings(8, 8000), &MEMORY, 32).unwrap();
        assert!(validated.warnings.is_empty());
        assert_eq!(validated.config.thread_count, 8);
        assert_eq!(validated.config.total_ram_mb, 8000);
        assert_eq!(validated.config.layout.rows, 2);
        assert_eq!(validated.config.timeout_secs, 60);
        assert!(validated.config.check(32).is_ok());
    }

    #[test]
    fn test_ram_defaults_to_available() {
        let mut input = settings(8, 0);
        input.ram = None;
        let validated = validate(&input, &MEMORY, 32).unwrap();
        assert_eq!(validated.config.total_ram_mb, 12_000);
        assert_eq!(
            validated.warnings,
            vec![ValidationWarning::RamDefaulted { available_mb: 12_000 }]
        );
    }

    #[test]
    fn test_ram_limits() {
        assert!(validate(&settings(8, 7), &MEMORY, 32).is_err());
        // 2 workers can test at most 4096 MB
        assert!(validate(&settings(2, 4097), &MEMORY, 32).is_err());
        assert!(validate(&settings(2, 4096), &MEMORY, 32).is_ok());
        // More than the machine has
        assert!(validate(&settings(16, 16_001), &MEMORY, 32).is_err());
    }

    #[test]
    fn test_ram_above_available_warns() {
        let validated = validate(&settings(8, 13_000), &MEMORY, 32).unwrap();
        assert!(validated.needs_confirmation());
        assert!(validated.warnings[0].to_string().contains("exceeds available RAM"));
    }

    #[test]
    fn test_stop_at_validation() {
        let mut input = settings(4, 4000);
        input.stop_at = true;
        assert!(validate(&input, &MEMORY, 32).is_err());

        input.stop_at_value = Some(0);
        assert!(validate(&input, &MEMORY, 32).is_err());

        input.stop_at_value = Some(300);
        assert_eq!(validate(&input, &MEMORY, 32).unwrap().config.stop_at_percent, Some(300));

        input.stop_at = false;
        assert_eq!(validate(&input, &MEMORY, 32).unwrap().config.stop_at_percent, None);
    }

    #[test]
    fn test_rows_must_divide_threads() {
        let mut input = settings(6, 6000);
        input.rows = Some(4);
        assert!(matches!(
            validate(&input, &MEMORY, 32),
            Err(FleetError::InvalidLayout { .. })
        ));

        input.rows = Some(3);
        assert_eq!(validate(&input, &MEMORY, 32).unwrap().config.layout.rows, 3);
    }

    #[test]
    fn test_thread_bounds() {
        assert!(matches!(
            validate(&settings(33, 33_00), &MEMORY, 32),
            Err(FleetError::CapacityExceeded { .. })
        ));
        assert!(validate(&settings(0, 1000), &MEMORY, 32).is_err());
    }

    #[test]
    fn test_timeout_defaulted() {
        let mut input = settings(4, 4000);
        input.timeout = None;
        let validated = validate(&input, &MEMORY, 32).unwrap();
        assert_eq!(validated.config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(!validated.needs_confirmation());
    }
}
