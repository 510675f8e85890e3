//! Aggregation of test results into a categorized report.
//!
//! Counters live in the [`Report`] produced per call to
//! [`Aggregator::summarize`]; nothing is carried over between runs.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::descriptor::Category;
use crate::orchestrator::TestResult;

mod reporter;

pub use reporter::Reporter;

/// Default number of failures listed individually.
pub const DEFAULT_FAILURE_CAP: usize = 20;

/// Default pass rate below which a category is unhealthy rather than degraded.
pub const DEFAULT_DEGRADED_FLOOR: f64 = 0.7;

/// Minimum pass rate per category.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    default: f64,
    per_category: BTreeMap<Category, f64>,
}

impl Thresholds {
    /// Every category requires `default`.
    #[must_use]
    pub const fn uniform(default: f64) -> Self {
        Self {
            default,
            per_category: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, category: Category, rate: f64) -> Self {
        self.per_category.insert(category, rate);
        self
    }

    #[must_use]
    pub fn for_category(&self, category: Category) -> f64 {
        self.per_category
            .get(&category)
            .copied()
            .unwrap_or(self.default)
    }
}

impl Default for Thresholds {
    /// Correctness categories need 100%; timing sensitive ones tolerate some loss.
    fn default() -> Self {
        Self::uniform(1.0)
            .with(Category::Stress, 0.7)
            .with(Category::Timeout, 0.9)
            .with(Category::Connection, 0.9)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Overall verdict band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Excellent,
    Good,
    Acceptable,
    SignificantIssues,
}

impl Recommendation {
    #[must_use]
    pub fn from_pass_rate(rate: f64) -> Self {
        if rate >= 0.95 {
            Self::Excellent
        } else if rate >= 0.85 {
            Self::Good
        } else if rate >= 0.70 {
            Self::Acceptable
        } else {
            Self::SignificantIssues
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT: server is highly conformant",
            Self::Good => "GOOD: server handles most cases, minor improvements needed",
            Self::Acceptable => "ACCEPTABLE: server works but needs improvements",
            Self::SignificantIssues => "NEEDS WORK: significant conformance issues",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoryStats {
    pub category: Category,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub threshold: f64,
    pub health: Health,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FailureEntry {
    pub name: String,
    pub category: Category,
    pub expected: String,
    pub actual: String,
    pub notes: Option<String>,
}

/// When and how a run happened.
#[serde_as]
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RunInfo {
    pub target: String,
    pub started_at: DateTime<Utc>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "duration_ms")]
    pub duration: Duration,
    pub interrupted: bool,
}

impl Default for RunInfo {
    fn default() -> Self {
        Self {
            target: String::new(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            interrupted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Report {
    pub run: RunInfo,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub categories: Vec<CategoryStats>,
    pub failures: Vec<FailureEntry>,
    pub omitted_failures: usize,
    pub recommendation: Recommendation,
}

impl Report {
    /// True when nothing failed and the run was not cut short.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0 && !self.run.interrupted
    }

    pub fn unhealthy_categories(&self) -> impl Iterator<Item = &CategoryStats> {
        self.categories
            .iter()
            .filter(|stats| stats.health == Health::Unhealthy)
    }

    #[must_use]
    pub fn category(&self, category: Category) -> Option<&CategoryStats> {
        self.categories.iter().find(|stats| stats.category == category)
    }
}

/// Stateless summarizer.
#[derive(Debug, Clone)]
pub struct Aggregator {
    thresholds: Thresholds,
    failure_cap: usize,
    degraded_floor: f64,
}

impl Aggregator {
    #[must_use]
    pub const fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            failure_cap: DEFAULT_FAILURE_CAP,
            degraded_floor: DEFAULT_DEGRADED_FLOOR,
        }
    }

    #[must_use]
    pub fn failure_cap(mut self, cap: usize) -> Self {
        self.failure_cap = cap;
        self
    }

    #[must_use]
    pub fn degraded_floor(mut self, floor: f64) -> Self {
        self.degraded_floor = floor;
        self
    }

    #[must_use]
    pub const fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    #[must_use]
    pub fn summarize(&self, results: &[TestResult]) -> Report {
        self.summarize_run(results, RunInfo::default())
    }

    #[must_use]
    pub fn summarize_run(&self, results: &[TestResult], run: RunInfo) -> Report {
        let total = results.len();
        let passed = results.iter().filter(|result| result.passed).count();

        let mut per_category: BTreeMap<Category, (usize, usize)> = BTreeMap::new();
        for result in results {
            let entry = per_category.entry(result.category).or_default();
            entry.0 += 1;
            if result.passed {
                entry.1 += 1;
            }
        }

        let categories = per_category
            .into_iter()
            .map(|(category, (total, passed))| self.category_stats(category, total, passed))
            .collect();

        let failing = results.iter().filter(|result| !result.passed);
        let failures: Vec<FailureEntry> = failing
            .clone()
            .take(self.failure_cap)
            .map(|result| FailureEntry {
                name: result.descriptor_name.clone(),
                category: result.category,
                expected: result.expected_description.clone(),
                actual: result.actual_observation.clone(),
                notes: result.notes.clone(),
            })
            .collect();
        let omitted_failures = failing.count() - failures.len();

        let pass_rate = ratio(passed, total);
        Report {
            run,
            total,
            passed,
            failed: total - passed,
            pass_rate,
            categories,
            failures,
            omitted_failures,
            recommendation: Recommendation::from_pass_rate(pass_rate),
        }
    }

    fn category_stats(&self, category: Category, total: usize, passed: usize) -> CategoryStats {
        let pass_rate = ratio(passed, total);
        let threshold = self.thresholds.for_category(category);
        let health = if pass_rate >= threshold {
            Health::Healthy
        } else if pass_rate >= self.degraded_floor {
            Health::Degraded
        } else {
            Health::Unhealthy
        };

        CategoryStats {
            category,
            total,
            passed,
            failed: total - passed,
            pass_rate,
            threshold,
            health,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, category: Category, passed: bool) -> TestResult {
        TestResult {
            descriptor_name: name.to_owned(),
            category,
            expected_description: "400".to_owned(),
            actual_observation: if passed { "HTTP/1.1 400 Bad Request" } else { "HTTP/1.1 200 OK" }.to_owned(),
            passed,
            notes: None,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn counts_and_category_rates() {
        let results = vec![
            result("m1", Category::Malformed, true),
            result("m2", Category::Malformed, false),
            result("s1", Category::Stress, true),
        ];

        let report = Aggregator::default().summarize(&results);

        assert_eq!((report.total, report.passed, report.failed), (3, 2, 1));
        assert!(!report.all_passed());
        let malformed = report.category(Category::Malformed).unwrap();
        assert!((malformed.pass_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(malformed.health, Health::Unhealthy);
        assert_eq!(report.category(Category::Stress).unwrap().health, Health::Healthy);
        assert!(report.category(Category::Uri).is_none());
        assert_eq!(report.unhealthy_categories().count(), 1);
    }

    #[test]
    fn thresholds_differ_per_category() {
        let mut results: Vec<_> = (0..8).map(|i| result(&format!("s{i}"), Category::Stress, true)).collect();
        results.extend((0..2).map(|i| result(&format!("f{i}"), Category::Stress, false)));
        results.extend((0..8).map(|i| result(&format!("h{i}"), Category::Header, true)));
        results.extend((0..2).map(|i| result(&format!("g{i}"), Category::Header, false)));

        let report = Aggregator::default().summarize(&results);
        assert_eq!(report.category(Category::Stress).unwrap().health, Health::Healthy);
        assert_eq!(report.category(Category::Header).unwrap().health, Health::Degraded);

        let strict = Aggregator::new(Thresholds::uniform(1.0)).degraded_floor(0.9).summarize(&results);
        assert_eq!(strict.category(Category::Stress).unwrap().health, Health::Unhealthy);
    }

    #[test]
    fn failure_list_is_capped_in_run_order() {
        let results: Vec<_> = (0..25).map(|i| result(&format!("bad {i}"), Category::Edge, false)).collect();

        let report = Aggregator::default().summarize(&results);
        assert_eq!(report.failures.len(), 20);
        assert_eq!(report.omitted_failures, 5);
        assert_eq!(report.failures[0].name, "bad 0");
        assert_eq!(report.failures[19].name, "bad 19");

        let small = Aggregator::default().failure_cap(3).summarize(&results);
        assert_eq!((small.failures.len(), small.omitted_failures), (3, 22));
    }

    #[test]
    fn recommendation_bands() {
        assert_eq!(Recommendation::from_pass_rate(1.0), Recommendation::Excellent);
        assert_eq!(Recommendation::from_pass_rate(0.9), Recommendation::Good);
        assert_eq!(Recommendation::from_pass_rate(0.7), Recommendation::Acceptable);
        assert_eq!(Recommendation::from_pass_rate(0.2), Recommendation::SignificantIssues);
    }

    #[test]
    fn empty_and_interrupted_runs() {
        let empty = Aggregator::default().summarize(&[]);
        assert_eq!(empty.total, 0);
        assert!(empty.all_passed());

        let interrupted = Aggregator::default().summarize_run(
            &[result("ok", Category::Method, true)],
            RunInfo {
                interrupted: true,
                ..RunInfo::default()
            },
        );
        assert!(!interrupted.all_passed());
    }
}
