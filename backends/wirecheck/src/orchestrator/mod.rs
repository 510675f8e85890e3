//! Executes descriptors and records results.
//!
//! WHY: Most categories must run one transaction at a time in table order,
//! while stress categories need many sockets in flight at once.
//!
//! WHAT: [`TestOrchestrator::run`] executes a slice of descriptors either on the
//! calling thread or on a bounded set of scoped worker threads, and returns one
//! [`TestResult`] per executed descriptor.
//!
//! HOW: Workers pull descriptors from a closed `ConcurrentQueue` and append to a
//! mutex guarded [`ResultLog`]; the scope joins every worker before returning,
//! so partial parallel results are never observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use concurrent_queue::ConcurrentQueue;
use serde_with::{serde_as, DurationMilliSeconds};

use crate::descriptor::{Category, TestDescriptor};
use crate::observation::Observation;
use crate::target::Target;
use crate::transaction::RawTransactionEngine;

mod suite;

pub use suite::{Batch, Gate, ResultObserver, SilentObserver, SuiteRunner, SKIPPED};

/// Scheduling of one group of descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// In enumeration order; the next transaction starts after the previous returned.
    Sequential,
    /// Up to `n` transactions in flight; result order is unspecified.
    Parallel(usize),
}

/// Record of one executed descriptor.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TestResult {
    pub descriptor_name: String,
    pub category: Category,
    pub expected_description: String,
    pub actual_observation: String,
    pub passed: bool,
    pub notes: Option<String>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "elapsed_ms")]
    pub elapsed: Duration,
}

/// Append-only result collection shared by workers.
#[derive(Debug, Default)]
pub struct ResultLog {
    results: Mutex<Vec<TestResult>>,
}

impl ResultLog {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn push(&self, result: TestResult) {
        let mut results = match self.results.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        results.push(result);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.results.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn into_results(self) -> Vec<TestResult> {
        match self.results.into_inner() {
            Ok(results) => results,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Runs descriptors against one target.
pub struct TestOrchestrator {
    target: Target,
    engine: RawTransactionEngine,
    stop: Arc<AtomicBool>,
}

impl TestOrchestrator {
    #[must_use]
    pub fn new(target: Target, engine: RawTransactionEngine) -> Self {
        Self {
            target,
            engine,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an external stop flag (e.g. raised by a Ctrl-C handler).
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub const fn engine(&self) -> &RawTransactionEngine {
        &self.engine
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Sends one transaction and returns what came back.
    #[must_use]
    pub fn observe(&self, descriptor: &TestDescriptor) -> Observation {
        Observation::from_transaction(self.engine.run(&self.target, descriptor.transaction()))
    }

    /// Executes and judges one descriptor.
    #[must_use]
    pub fn execute(&self, descriptor: &TestDescriptor) -> TestResult {
        let started = Instant::now();
        let observation = self.observe(descriptor);
        let elapsed = started.elapsed();
        let evaluation = descriptor.expectation().evaluate(&observation);

        tracing::debug!(
            "{} [{}]: {} ({})",
            descriptor.name(),
            descriptor.category(),
            observation,
            if evaluation.passed { "pass" } else { "fail" }
        );

        TestResult {
            descriptor_name: descriptor.name().to_owned(),
            category: descriptor.category(),
            expected_description: descriptor.expectation().describe(),
            actual_observation: observation.summary(),
            passed: evaluation.passed,
            notes: evaluation.notes,
            elapsed,
        }
    }

    /// Executes `descriptors` in the requested mode.
    ///
    /// Descriptors not started before the stop flag was raised are not recorded.
    #[must_use]
    pub fn run(&self, descriptors: &[TestDescriptor], mode: ExecutionMode) -> Vec<TestResult> {
        match mode {
            ExecutionMode::Sequential => self.run_sequential(descriptors),
            ExecutionMode::Parallel(workers) => self.run_parallel(descriptors, workers),
        }
    }

    fn run_sequential(&self, descriptors: &[TestDescriptor]) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if self.is_stopped() {
                tracing::info!("stop requested, {} descriptors left unexecuted", descriptors.len() - results.len());
                break;
            }
            results.push(self.execute(descriptor));
        }
        results
    }

    fn run_parallel(&self, descriptors: &[TestDescriptor], workers: usize) -> Vec<TestResult> {
        if descriptors.is_empty() {
            return Vec::new();
        }

        let queue = ConcurrentQueue::unbounded();
        for descriptor in descriptors {
            if queue.push(descriptor).is_err() {
                break;
            }
        }
        queue.close();

        let log = ResultLog::with_capacity(descriptors.len());
        let workers = workers.clamp(1, descriptors.len());

        let spawned = thread::scope(|scope| {
            let mut spawned = 0;
            for worker in 0..workers {
                let queue = &queue;
                let log = &log;
                let handle = thread::Builder::new()
                    .name(format!("wirecheck-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        while !self.is_stopped() {
                            let Ok(descriptor) = queue.pop() else {
                                break;
                            };
                            log.push(self.execute(descriptor));
                        }
                    });

                match handle {
                    Ok(_) => spawned += 1,
                    Err(err) => tracing::warn!("failed to spawn worker {worker}: {err}"),
                }
            }
            spawned
        });

        if spawned == 0 {
            tracing::warn!("no worker threads available, running batch on the control thread");
            return self.run_sequential(descriptors);
        }

        log.into_results()
    }
}
