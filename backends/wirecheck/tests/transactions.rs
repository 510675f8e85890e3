//! Transaction and orchestration behaviour against live sockets.

use std::net::TcpListener;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ntest::timeout;
use tracing_test::traced_test;

use wirecheck::errors::ConnectionErrorKind;
use wirecheck::{
    Category, ExecutionMode, Expectation, RawTransactionEngine, Target, TestDescriptor, TestOrchestrator,
    TransactionSpec,
};
use wirecheck_testing::StubServer;

fn get_root(name: &str) -> TestDescriptor {
    TestDescriptor::new(
        name,
        Category::Method,
        TransactionSpec::whole(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec()),
        Expectation::status(&[200]),
    )
}

/// WHY: A server that accepts and never answers must not hang the harness
/// WHAT: The engine gives up after the transaction timeout with a timeout error
#[test]
#[timeout(5000)]
fn black_hole_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = Target::new("127.0.0.1", listener.local_addr().unwrap().port());
    let holder = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let spec = TransactionSpec::whole(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec())
        .timeout(Duration::from_millis(300));
    let started = Instant::now();
    let err = RawTransactionEngine::default().run(&target, &spec).unwrap_err();

    assert_eq!(err.kind(), ConnectionErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
    holder.join().unwrap();
}

/// WHY: Transaction traffic is only debuggable through the logs
/// WHAT: Connect and read events are logged with the peer and byte counts
#[test]
#[traced_test]
#[timeout(10000)]
fn transactions_are_logged() {
    let server = StubServer::start().unwrap();
    let orchestrator = TestOrchestrator::new(
        Target::new(server.host(), server.port()),
        RawTransactionEngine::new(Duration::from_secs(2)),
    );

    let result = orchestrator.execute(&get_root("Method 1: GET"));
    assert!(result.passed, "{}", result.actual_observation);
    assert!(logs_contain("connected to 127.0.0.1"));
    assert!(logs_contain("bytes from"));
}

/// WHY: Ctrl-C must stop dispatch without losing what already ran
/// WHAT: With the stop flag raised nothing is dispatched in either mode
#[test]
#[timeout(10000)]
fn raised_stop_flag_dispatches_nothing() {
    let server = StubServer::start().unwrap();
    let orchestrator = TestOrchestrator::new(
        Target::new(server.host(), server.port()),
        RawTransactionEngine::new(Duration::from_secs(2)),
    )
    .with_stop_flag(Arc::new(AtomicBool::new(true)));

    let descriptors: Vec<TestDescriptor> = (0..5).map(|i| get_root(&format!("GET {i}"))).collect();
    assert!(orchestrator.run(&descriptors, ExecutionMode::Sequential).is_empty());
    assert!(orchestrator.run(&descriptors, ExecutionMode::Parallel(3)).is_empty());
    assert_eq!(server.connections(), 0);
}

/// WHY: Sequential categories depend on table order
/// WHAT: Sequential results come back in descriptor order, parallel ones all come back
#[test]
#[timeout(20000)]
fn result_order_and_completeness() {
    let server = StubServer::start().unwrap();
    let orchestrator = TestOrchestrator::new(
        Target::new(server.host(), server.port()),
        RawTransactionEngine::new(Duration::from_secs(2)),
    );
    let descriptors: Vec<TestDescriptor> = (0..8).map(|i| get_root(&format!("GET {i}"))).collect();

    let sequential = orchestrator.run(&descriptors, ExecutionMode::Sequential);
    let names: Vec<&str> = sequential.iter().map(|result| result.descriptor_name.as_str()).collect();
    let expected: Vec<String> = (0..8).map(|i| format!("GET {i}")).collect();
    assert_eq!(names, expected);

    let parallel = orchestrator.run(&descriptors, ExecutionMode::Parallel(4));
    assert_eq!(parallel.len(), 8);
    assert!(parallel.iter().all(|result| result.passed));
}
