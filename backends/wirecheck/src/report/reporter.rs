//! Human readable and JSON rendering of a [`Report`].

use std::fmt::{self, Write as _};
use std::io::Write;
use std::path::Path;

use super::{Health, Report};
use crate::errors::{HarnessError, HarnessResult};

impl Health {
    #[must_use]
    pub const fn marker(&self) -> &'static str {
        match self {
            Self::Healthy => "[ OK ]",
            Self::Degraded => "[WARN]",
            Self::Unhealthy => "[FAIL]",
        }
    }
}

impl Report {
    /// Generates the categorized text report.
    #[must_use]
    pub fn to_string_pretty(&self) -> String {
        let mut report = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_pretty(&mut report);
        report
    }

    fn write_pretty(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "=== WIRECHECK REPORT ===")?;
        if !self.run.target.is_empty() {
            writeln!(out, "Target: {}", self.run.target)?;
        }
        writeln!(out, "Started: {}", self.run.started_at.to_rfc3339())?;
        writeln!(out, "Duration: {:?}", self.run.duration)?;
        if self.run.interrupted {
            writeln!(out, "Run was INTERRUPTED before all tests executed")?;
        }
        writeln!(out)?;
        writeln!(out, "Total Tests: {}", self.total)?;
        writeln!(out, "Passed: {}", self.passed)?;
        writeln!(out, "Failed: {}", self.failed)?;
        writeln!(out, "Success Rate: {:.1}%", self.pass_rate * 100.0)?;

        if !self.categories.is_empty() {
            writeln!(out, "\nCATEGORY BREAKDOWN:")?;
            for stats in &self.categories {
                writeln!(
                    out,
                    "{} {}: {}/{} ({:.1}%, needs {:.0}%)",
                    stats.health.marker(),
                    stats.category.title(),
                    stats.passed,
                    stats.total,
                    stats.pass_rate * 100.0,
                    stats.threshold * 100.0,
                )?;
            }
        }

        if !self.failures.is_empty() {
            writeln!(out, "\nFAILED TESTS ({}):", self.failed)?;
            for failure in &self.failures {
                writeln!(
                    out,
                    "  - {} [{}]: expected {}, got {}",
                    failure.name, failure.category, failure.expected, failure.actual
                )?;
                if let Some(notes) = &failure.notes {
                    writeln!(out, "      {notes}")?;
                }
            }
            if self.omitted_failures > 0 {
                writeln!(out, "  ... and {} more", self.omitted_failures)?;
            }
        }

        writeln!(out, "\n{}", self.recommendation.message())
    }

    /// Serializes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Propagates serialization failures.
    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_pretty())
    }
}

/// Writes reports to their destinations.
pub struct Reporter;

impl Reporter {
    /// Writes the JSON form of `report` to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ReportWrite`] or [`HarnessError::ReportEncode`].
    pub fn write_json(report: &Report, path: &Path) -> HarnessResult<()> {
        let json = report.to_json()?;
        let mut file = std::fs::File::create(path).map_err(HarnessError::ReportWrite)?;
        file.write_all(json.as_bytes())
            .map_err(HarnessError::ReportWrite)?;
        tracing::info!("wrote JSON report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::descriptor::Category;
    use crate::orchestrator::TestResult;
    use crate::report::Aggregator;

    fn failing(i: usize) -> TestResult {
        TestResult {
            descriptor_name: format!("Malformed {i}"),
            category: Category::Malformed,
            expected_description: "400/411 or connection error".into(),
            actual_observation: "HTTP/1.1 200 OK".into(),
            passed: false,
            notes: Some("status 200 not in 400/411".into()),
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn pretty_report_lists_capped_failures() {
        let results: Vec<_> = (0..22).map(failing).collect();
        let text = Aggregator::default().summarize(&results).to_string();

        assert!(text.starts_with("=== WIRECHECK REPORT ==="));
        assert!(text.contains("Total Tests: 22"));
        assert!(text.contains("[FAIL] Malformed Requests: 0/22"));
        assert!(text.contains("FAILED TESTS (22):"));
        assert!(text.contains("  - Malformed 0 [malformed]: expected 400/411 or connection error, got HTTP/1.1 200 OK"));
        assert!(text.contains("  ... and 2 more"));
        assert!(text.contains("NEEDS WORK"));
    }

    #[test]
    fn json_report_round_trips_through_serde() {
        let report = Aggregator::default().summarize(&[failing(1)]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["total"], 1);
        assert_eq!(value["categories"][0]["category"], "malformed");
        assert_eq!(value["categories"][0]["health"], "unhealthy");
        assert_eq!(value["failures"][0]["actual"], "HTTP/1.1 200 OK");
        assert_eq!(value["recommendation"], "significant_issues");
        assert!(value["run"]["duration_ms"].is_u64());
    }

    #[test]
    fn json_report_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = Aggregator::default().summarize(&[failing(1)]);

        super::Reporter::write_json(&report, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"omitted_failures\": 0"));
    }
}
