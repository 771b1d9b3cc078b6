//! RAM and CPU limits of the current machine.
//!
//! Memory figures come from `/proc/meminfo`, in MB.

use std::path::Path;

use memfleet_core::{FleetError, Result};
use tracing::debug;

/// Workers allowed per logical CPU.
pub const THREADS_PER_CPU: usize = 4;

/// Physical memory of the machine, in MB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemMemory {
    pub total_mb: u64,
    pub available_mb: u64,
}

impl SystemMemory {
    /// Read memory figures from `/proc/meminfo`.
    pub fn read() -> Result<Self> {
        Self::read_from(Path::new("/proc/meminfo"))
    }

    /// Read memory figures from a meminfo-formatted file.
    pub fn read_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FleetError::io("reading memory information", path, e))?;
        let memory = Self::parse(&content).ok_or_else(|| FleetError::SystemInfo {
            message: format!("MemTotal/MemAvailable missing in {}", path.display()),
        })?;
        debug!(
            total_mb = memory.total_mb,
            available_mb = memory.available_mb,
            "read system memory"
        );
        Ok(memory)
    }

    /// Parse `MemTotal` and `MemAvailable` (kB) out of meminfo text.
    pub fn parse(content: &str) -> Option<Self> {
        let mut total_kb = None;
        let mut available_kb = None;

        for line in content.lines() {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("MemTotal:") => total_kb = parts.next().and_then(|v| v.parse::<u64>().ok()),
                Some("MemAvailable:") => {
                    available_kb = parts.next().and_then(|v| v.parse::<u64>().ok())
                }
                _ => {}
            }
        }

        Some(Self {
            total_mb: total_kb? / 1024,
            available_mb: available_kb? / 1024,
        })
    }
}

/// Number of logical CPUs, at least 1.
pub fn logical_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Upper bound on the number of workers in a fleet.
pub fn thread_capacity() -> usize {
    logical_cpus() * THREADS_PER_CPU
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       16318480 kB
MemFree:         1221736 kB
MemAvailable:    9547300 kB
Buffers:          524288 kB
";

    #[test]
    fn test_parse_meminfo() {
        let memory = SystemMemory::parse(MEMINFO).unwrap();
        assert_eq!(memory.total_mb, 15936);
        assert_eq!(memory.available_mb, 9323);
    }

    #[test]
    fn test_parse_meminfo_missing_field() {
        assert!(SystemMemory::parse("MemTotal: 1024 kB\n").is_none());
        assert!(SystemMemory::parse("").is_none());
    }

    #[test]
    fn test_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        std::fs::write(&path, MEMINFO).unwrap();
        assert_eq!(SystemMemory::read_from(&path).unwrap().total_mb, 15936);

        let err = SystemMemory::read_from(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, FleetError::Io { .. }));
    }

    #[test]
    fn test_capacity_is_four_per_cpu() {
        assert!(logical_cpus() >= 1);
        assert_eq!(thread_capacity(), logical_cpus() * 4);
    }
}
