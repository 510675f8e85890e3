//! Raw-socket conformance testing for HTTP/1.1 servers.
//!
//! This crate provides:
//! - **Transaction engine**: one TCP connect/write/read cycle per test, with
//!   optional fragmented and delayed delivery
//! - **Response parser**: a total, best-effort parser over whatever came back
//! - **Server lifecycle**: spawn, readiness polling and guaranteed teardown
//! - **Registry**: the enumerated corpus of test descriptors
//! - **Orchestrator**: sequential and parallel execution, gated and quorum batches
//! - **Report**: per-category pass rates, health and a bounded failure list
//!
//! # Examples
//!
//! ```rust
//! use wirecheck::{Expectation, Observation};
//!
//! let bytes = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n".to_vec();
//! let observation = Observation::from_transaction(Ok(bytes));
//!
//! let expectation = Expectation::status(&[400, 411]).or_connection_error();
//! assert!(expectation.evaluate(&observation).passed);
//! assert_eq!(expectation.describe(), "400/411 or connection error");
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod descriptor;
pub mod errors;
pub mod latin1;
pub mod lifecycle;
pub mod observation;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod report;
pub mod target;
pub mod transaction;

// Re-export commonly used items
pub use config::HarnessConfig;
pub use descriptor::{Category, Expectation, ResponseRule, TestDescriptor};
pub use errors::{ConnectionError, ConnectionErrorKind, HarnessError, HarnessResult};
pub use lifecycle::{ReadinessPolicy, ServerHandle, ServerLauncher};
pub use observation::Observation;
pub use orchestrator::{Batch, ExecutionMode, SuiteRunner, TestOrchestrator, TestResult};
pub use parser::ParsedResponse;
pub use registry::{standard_suite, RegistryOptions};
pub use report::{Aggregator, Report, Reporter, Thresholds};
pub use target::Target;
pub use transaction::{RawTransactionEngine, TransactionSpec};
