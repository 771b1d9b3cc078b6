//! Throughput and ETA derived from the total coverage.

use std::time::Duration;

use memfleet_core::CoverageRecord;
use serde::Serialize;

/// Derived statistics for one stats tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    /// RAM tested per second, in MB
    pub throughput_mb_per_sec: f64,
    /// Time left until `next_milestone`
    pub eta: Duration,
    /// Next multiple of 100% above the current total
    pub next_milestone: u32,
}

impl Estimate {
    /// ETA text, e.g. `00h03m00s to 100%`.
    pub fn describe_eta(&self) -> String {
        format!("{} to {}%", format_hms(self.eta), self.next_milestone)
    }

    /// Throughput text, e.g. `33.33MB/s`.
    pub fn describe_speed(&self) -> String {
        format!("{:.2}MB/s", self.throughput_mb_per_sec)
    }
}

/// Estimate progress from the elapsed time and the total coverage.
///
/// Returns `None` while there is nothing to extrapolate from: no coverage
/// yet, or no time elapsed.
pub fn estimate(
    elapsed: Duration,
    total_coverage_percent: f64,
    total_ram_mb: u64,
) -> Option<Estimate> {
    if !total_coverage_percent.is_finite() || total_coverage_percent <= 0.0 {
        return None;
    }
    let elapsed_secs = elapsed.as_secs_f64();
    if elapsed_secs <= 0.0 {
        return None;
    }

    let next_milestone = ((total_coverage_percent / 100.0).floor() as u32 + 1) * 100;
    let eta_secs = elapsed_secs / total_coverage_percent * next_milestone as f64 - elapsed_secs;
    let throughput = (total_coverage_percent / 100.0) * total_ram_mb as f64 / elapsed_secs;

    Some(Estimate {
        throughput_mb_per_sec: throughput,
        eta: Duration::try_from_secs_f64(eta_secs.max(0.0)).ok()?,
        next_milestone,
    })
}

/// Format a duration as `00h00m00s`. Hours are not wrapped at 24.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}h{:02}m{:02}s", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// One stats tick as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub elapsed: Duration,
    pub total: CoverageRecord,
    pub estimate: Option<Estimate>,
}

impl ProgressReport {
    pub fn new(elapsed: Duration, total: CoverageRecord, total_ram_mb: u64) -> Self {
        let estimate = estimate(elapsed, total.coverage_percent, total_ram_mb);
        Self {
            elapsed,
            total,
            estimate,
        }
    }
}

impl std::fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | coverage {:.1}% | {} errors",
            format_hms(self.elapsed),
            self.total.coverage_percent,
            self.total.error_count
        )?;
        if let Some(estimate) = &self.estimate {
            write!(f, " | {} | {}", estimate.describe_eta(), estimate.describe_speed())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memfleet_core::CoverageSnapshot;

    #[test]
    fn test_no_estimate_without_coverage() {
        assert!(estimate(Duration::from_secs(60), 0.0, 8000).is_none());
        assert!(estimate(Duration::from_secs(60), -3.0, 8000).is_none());
        assert!(estimate(Duration::from_secs(60), f64::NAN, 8000).is_none());
    }

    #[test]
    fn test_no_estimate_without_elapsed_time() {
        assert!(estimate(Duration::ZERO, 10.0, 8000).is_none());
    }

    #[test]
    fn test_quarter_way_to_first_milestone() {
        let estimate = estimate(Duration::from_secs(60), 25.0, 8000).unwrap();
        assert_eq!(estimate.next_milestone, 100);
        assert!((estimate.eta.as_secs_f64() - 180.0).abs() < 1e-6);
        assert!((estimate.throughput_mb_per_sec - 33.333_333).abs() < 1e-3);
        assert_eq!(estimate.describe_speed(), "33.33MB/s");
    }

    #[test]
    fn test_milestone_rounds_up_past_hundred() {
        assert_eq!(estimate(Duration::from_secs(10), 100.01, 100).unwrap().next_milestone, 200);
        assert_eq!(estimate(Duration::from_secs(10), 100.0, 100).unwrap().next_milestone, 200);
        assert_eq!(estimate(Duration::from_secs(10), 99.9, 100).unwrap().next_milestone, 100);
        assert_eq!(estimate(Duration::from_secs(10), 350.0, 100).unwrap().next_milestone, 400);
    }

    #[test]
    fn test_describe_eta() {
        let estimate = estimate(Duration::from_secs(100), 50.0, 1000).unwrap();
        assert_eq!(estimate.describe_eta(), "00h01m40s to 100%");
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::ZERO), "00h00m00s");
        assert_eq!(format_hms(Duration::from_secs(3723)), "01h02m03s");
        assert_eq!(format_hms(Duration::from_secs(100 * 3600 + 59)), "100h00m59s");
    }

    #[test]
    fn test_progress_report_display() {
        let mut total = CoverageRecord::total();
        total.apply(CoverageSnapshot::new(50.0, 1));

        let report = ProgressReport::new(Duration::from_secs(100), total.clone(), 1000);
        assert_eq!(
            report.to_string(),
            "00h01m40s | coverage 50.0% | 1 errors | 00h01m40s to 100% | 5.00MB/s"
        );

        let idle = ProgressReport::new(Duration::from_secs(5), CoverageRecord::total(), 1000);
        assert_eq!(idle.to_string(), "00h00m05s | coverage 0.0% | 0 errors");
    }
}
