//! Batches of descriptors and the runner that walks them in order.

use std::time::{Duration, Instant};

use crate::descriptor::{Category, TestDescriptor};
use crate::observation::Observation;
use crate::orchestrator::{ExecutionMode, TestOrchestrator, TestResult};
use crate::transaction::TransactionSpec;

/// Observation recorded for descriptors of a skipped batch.
pub const SKIPPED: &str = "SKIPPED";

/// How many failing members a quorum summary names.
const QUORUM_NOTE_LIMIT: usize = 3;

/// Probe deciding whether an optional feature batch runs at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    probe: TransactionSpec,
    skip_on_status: Vec<u16>,
    reason: String,
}

impl Gate {
    /// Skips when the probe fails at connection level or answers with one of `skip_on_status`.
    #[must_use]
    pub fn new(probe: TransactionSpec, skip_on_status: &[u16], reason: impl Into<String>) -> Self {
        Self {
            probe,
            skip_on_status: skip_on_status.to_vec(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn probe(&self) -> &TransactionSpec {
        &self.probe
    }

    /// `Some(reason)` when the batch must be skipped.
    #[must_use]
    pub fn skip_reason(&self, observation: &Observation) -> Option<String> {
        match observation {
            Observation::Failure(error) => Some(format!("{} ({error})", self.reason)),
            Observation::Response(response) => response
                .status_code()
                .filter(|code| self.skip_on_status.contains(code))
                .map(|code| format!("{} (probe answered {code})", self.reason)),
        }
    }
}

/// An ordered group of descriptors sharing a category and a scheduling mode.
#[derive(Debug, Clone)]
pub struct Batch {
    title: String,
    category: Category,
    mode: ExecutionMode,
    descriptors: Vec<TestDescriptor>,
    quorum: Option<f64>,
    gate: Option<Gate>,
}

impl Batch {
    #[must_use]
    pub fn sequential(title: impl Into<String>, category: Category, descriptors: Vec<TestDescriptor>) -> Self {
        Self {
            title: title.into(),
            category,
            mode: ExecutionMode::Sequential,
            descriptors,
            quorum: None,
            gate: None,
        }
    }

    #[must_use]
    pub fn parallel(
        title: impl Into<String>,
        category: Category,
        workers: usize,
        descriptors: Vec<TestDescriptor>,
    ) -> Self {
        Self {
            mode: ExecutionMode::Parallel(workers),
            ..Self::sequential(title, category, descriptors)
        }
    }

    /// Folds member results into one result passing at `ratio` successes.
    #[must_use]
    pub fn with_quorum(mut self, ratio: f64) -> Self {
        self.quorum = Some(ratio.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[must_use]
    pub fn descriptors(&self) -> &[TestDescriptor] {
        &self.descriptors
    }

    #[must_use]
    pub const fn quorum(&self) -> Option<f64> {
        self.quorum
    }

    #[must_use]
    pub const fn gate(&self) -> Option<&Gate> {
        self.gate.as_ref()
    }

    /// Number of results this batch contributes to a report.
    #[must_use]
    pub fn result_count(&self) -> usize {
        if self.quorum.is_some() {
            1
        } else {
            self.descriptors.len()
        }
    }
}

/// Progress callbacks, invoked on the control thread only.
pub trait ResultObserver {
    fn on_batch_start(&mut self, _batch: &Batch) {}
    fn on_result(&mut self, _result: &TestResult) {}
    fn on_batch_skipped(&mut self, _batch: &Batch, _reason: &str) {}
}

/// Discards every callback.
pub struct SilentObserver;

impl ResultObserver for SilentObserver {}

/// Walks a suite plan batch by batch.
pub struct SuiteRunner<'a> {
    orchestrator: &'a TestOrchestrator,
}

impl<'a> SuiteRunner<'a> {
    #[must_use]
    pub const fn new(orchestrator: &'a TestOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Runs every batch in plan order, joining each before the next starts.
    pub fn run(&self, plan: &[Batch], observer: &mut dyn ResultObserver) -> Vec<TestResult> {
        let mut results = Vec::new();
        for batch in plan {
            if self.orchestrator.is_stopped() {
                break;
            }
            let batch_results = self.run_batch(batch, observer);
            for result in &batch_results {
                observer.on_result(result);
            }
            results.extend(batch_results);
        }
        results
    }

    fn run_batch(&self, batch: &Batch, observer: &mut dyn ResultObserver) -> Vec<TestResult> {
        observer.on_batch_start(batch);

        if let Some(gate) = batch.gate() {
            let probe = Observation::from_transaction(
                self.orchestrator
                    .engine()
                    .run(self.orchestrator.target(), gate.probe()),
            );
            if let Some(reason) = gate.skip_reason(&probe) {
                tracing::warn!("skipping {}: {reason}", batch.title());
                observer.on_batch_skipped(batch, &reason);
                return skipped(batch, &reason);
            }
        }

        let started = Instant::now();
        let results = self.orchestrator.run(batch.descriptors(), batch.mode());
        match batch.quorum() {
            Some(ratio) if !results.is_empty() => vec![fold_quorum(batch, ratio, &results, started.elapsed())],
            _ => results,
        }
    }
}

fn skipped(batch: &Batch, reason: &str) -> Vec<TestResult> {
    batch
        .descriptors()
        .iter()
        .map(|descriptor| TestResult {
            descriptor_name: descriptor.name().to_owned(),
            category: descriptor.category(),
            expected_description: descriptor.expectation().describe(),
            actual_observation: SKIPPED.to_owned(),
            passed: true,
            notes: Some(reason.to_owned()),
            elapsed: Duration::ZERO,
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn fold_quorum(batch: &Batch, ratio: f64, members: &[TestResult], elapsed: Duration) -> TestResult {
    let total = members.len();
    let successes = members.iter().filter(|member| member.passed).count();
    let achieved = successes as f64 / total as f64;

    let failing: Vec<String> = members
        .iter()
        .filter(|member| !member.passed)
        .take(QUORUM_NOTE_LIMIT)
        .map(|member| format!("{}: {}", member.descriptor_name, member.actual_observation))
        .collect();

    TestResult {
        descriptor_name: batch.title().to_owned(),
        category: batch.category(),
        expected_description: format!(">= {:.0}% of {} successful", ratio * 100.0, batch.descriptors().len()),
        actual_observation: format!("{successes}/{total} successful"),
        passed: achieved >= ratio,
        notes: (!failing.is_empty()).then(|| failing.join("; ")),
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use crate::descriptor::Expectation;
    use crate::target::Target;
    use crate::transaction::RawTransactionEngine;

    /// Answers 404 for `/missing`, 200 otherwise.
    fn server() -> Target {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                thread::spawn(move || {
                    let mut buf = [0u8; 1024];
                    let n = stream.read(&mut buf).unwrap_or(0);
                    let reply: &[u8] = if buf[..n].starts_with(b"GET /missing") {
                        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"
                    } else {
                        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"
                    };
                    let _ = stream.write_all(reply);
                });
            }
        });
        Target::new("127.0.0.1", port)
    }

    fn descriptor(name: &str, path: &str, codes: &[u16]) -> TestDescriptor {
        TestDescriptor::new(
            name,
            Category::Cgi,
            TransactionSpec::whole(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n")),
            Expectation::status(codes),
        )
    }

    #[derive(Default)]
    struct Recording {
        started: Vec<String>,
        skipped: Vec<String>,
        results: usize,
    }

    impl ResultObserver for Recording {
        fn on_batch_start(&mut self, batch: &Batch) {
            self.started.push(batch.title().to_owned());
        }

        fn on_result(&mut self, _result: &TestResult) {
            self.results += 1;
        }

        fn on_batch_skipped(&mut self, batch: &Batch, _reason: &str) {
            self.skipped.push(batch.title().to_owned());
        }
    }

    #[test]
    fn gated_batch_is_skipped_as_passed() {
        let orchestrator = TestOrchestrator::new(server(), RawTransactionEngine::new(Duration::from_secs(2)));
        let batch = Batch::sequential(
            "cgi",
            Category::Cgi,
            vec![descriptor("cgi 1", "/cgi-bin/x", &[500]), descriptor("cgi 2", "/cgi-bin/y", &[500])],
        )
        .with_gate(Gate::new(
            TransactionSpec::whole("GET /missing HTTP/1.1\r\nHost: localhost\r\n\r\n"),
            &[404],
            "cgi not configured",
        ));

        let mut observer = Recording::default();
        let results = SuiteRunner::new(&orchestrator).run(&[batch], &mut observer);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed && r.actual_observation == SKIPPED));
        assert_eq!(observer.skipped, ["cgi"]);
        assert_eq!(observer.results, 2);
    }

    #[test]
    fn open_gate_runs_the_batch() {
        let orchestrator = TestOrchestrator::new(server(), RawTransactionEngine::new(Duration::from_secs(2)));
        let batch = Batch::sequential("cgi", Category::Cgi, vec![descriptor("cgi 1", "/cgi-bin/x", &[200])])
            .with_gate(Gate::new(
                TransactionSpec::whole("GET /cgi-bin/x HTTP/1.1\r\nHost: localhost\r\n\r\n"),
                &[404],
                "cgi not configured",
            ));

        let results = SuiteRunner::new(&orchestrator).run(&[batch], &mut SilentObserver);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].actual_observation, "HTTP/1.1 200 OK");
    }

    #[test]
    fn quorum_batches_fold_into_one_result() {
        let orchestrator = TestOrchestrator::new(server(), RawTransactionEngine::new(Duration::from_secs(2)));
        let members = vec![
            descriptor("ok 1", "/", &[200]),
            descriptor("ok 2", "/", &[200]),
            descriptor("ok 3", "/", &[200]),
            descriptor("bad", "/missing", &[200]),
        ];
        let lenient = Batch::parallel("lenient", Category::Stress, 4, members.clone()).with_quorum(0.7);
        let strict = Batch::sequential("strict", Category::Stress, members).with_quorum(0.9);

        let mut observer = Recording::default();
        let results = SuiteRunner::new(&orchestrator).run(&[lenient, strict], &mut observer);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].actual_observation, "3/4 successful");
        assert!(results[0].passed);
        assert_eq!(results[0].expected_description, ">= 70% of 4 successful");
        assert!(!results[1].passed);
        assert_eq!(results[1].notes.as_deref(), Some("bad: HTTP/1.1 404 Not Found"));
        assert_eq!(observer.started, ["lenient", "strict"]);
    }
}
