use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use wirecheck::config::{ConfigError, ServerConfig};
use wirecheck::lifecycle;
use wirecheck::orchestrator::ResultObserver;
use wirecheck::report::RunInfo;
use wirecheck::{
    standard_suite, Batch, Category, HarnessConfig, HarnessError, HarnessResult, RawTransactionEngine, Reporter,
    ServerLauncher, SuiteRunner, TestOrchestrator, TestResult,
};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Checks an HTTP/1.1 server against a corpus of raw-socket conformance tests.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Host of the server under test
    host: Option<String>,

    /// Port of the server under test
    port: Option<u16>,

    /// Harness configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server executable to start before testing and stop afterwards
    #[arg(long)]
    server: Option<PathBuf>,

    /// Configuration file passed to the server executable
    #[arg(long, requires = "server")]
    server_config: Option<PathBuf>,

    /// Parallel width of the stress batches
    #[arg(long)]
    concurrency: Option<usize>,

    /// Default per-transaction timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Only run this category (repeatable)
    #[arg(long = "only", value_name = "CATEGORY")]
    only: Vec<Category>,

    /// Print the test registry and exit without connecting
    #[arg(long)]
    list: bool,

    /// Also write the report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Log verbosity: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Layers flags and positionals over the loaded configuration.
    ///
    /// `--server` without `--server-config` keeps the `[server]` config path
    /// from the file; with neither the server has nothing to start with.
    fn apply(&self, mut config: HarnessConfig) -> Result<HarnessConfig, ConfigError> {
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.default_timeout = Duration::from_millis(timeout_ms);
        }
        if !self.only.is_empty() {
            config.only = self.only.iter().map(|category| category.as_str().to_owned()).collect();
        }
        if let Some(executable) = &self.server {
            let grace_period = config
                .server
                .as_ref()
                .map_or(DEFAULT_GRACE_PERIOD, |server| server.grace_period);
            let server_config = self
                .server_config
                .clone()
                .or_else(|| config.server.as_ref().map(|server| server.config.clone()))
                .ok_or_else(|| ConfigError::MissingServerConfig(executable.clone()))?;
            config.server = Some(ServerConfig {
                executable: executable.clone(),
                config: server_config,
                grace_period,
            });
        }
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }
}

/// Prints one line per result as batches finish.
struct ProgressObserver;

impl ResultObserver for ProgressObserver {
    fn on_batch_start(&mut self, batch: &Batch) {
        println!("\n=== {} ===", batch.title());
    }

    fn on_result(&mut self, result: &TestResult) {
        if result.passed {
            println!("  [PASS] {}: {}", result.descriptor_name, result.actual_observation);
        } else {
            println!(
                "  [FAIL] {}: {} (expected {})",
                result.descriptor_name, result.actual_observation, result.expected_description
            );
        }
    }

    fn on_batch_skipped(&mut self, batch: &Batch, reason: &str) {
        println!("  [SKIP] {}: {reason}", batch.title());
    }
}

fn print_plan(plan: &[Batch]) {
    let mut count = 0;
    for batch in plan {
        println!("{} [{}, {:?}]", batch.title(), batch.category(), batch.mode());
        for descriptor in batch.descriptors() {
            println!("  {}: {}", descriptor.name(), descriptor.expectation().describe());
            count += 1;
        }
    }
    println!("\n{count} tests in {} batches", plan.len());
}

/// Runs the suite; `Ok(true)` only when every recorded result passed.
fn run(args: &Args, stop: &Arc<AtomicBool>) -> HarnessResult<bool> {
    let loaded = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    let config = args.apply(loaded)?;

    let plan = standard_suite(&config.registry_options()?);
    if args.list {
        print_plan(&plan);
        return Ok(true);
    }
    let aggregator = config.aggregator()?;
    let target = config.target();

    let mut server = match &config.server {
        Some(server) => Some(
            ServerLauncher::new(&server.executable, &server.config, target.clone())
                .readiness(config.readiness_policy())
                .grace_period(server.grace_period)
                .start()?,
        ),
        None => {
            let waited = lifecycle::wait_until_ready(&target, &config.readiness_policy())?;
            tracing::info!("attached to running server at {target} after {waited:?}");
            None
        }
    };

    let started_at = Utc::now();
    let started = Instant::now();
    let orchestrator = TestOrchestrator::new(target.clone(), RawTransactionEngine::new(config.default_timeout))
        .with_stop_flag(Arc::clone(stop));
    let results = SuiteRunner::new(&orchestrator).run(&plan, &mut ProgressObserver);
    let interrupted = stop.load(Ordering::Relaxed);

    let teardown = server.as_mut().map(|handle| handle.stop()).transpose();

    let report = aggregator.summarize_run(
        &results,
        RunInfo {
            target: target.to_string(),
            started_at,
            duration: started.elapsed(),
            interrupted,
        },
    );
    println!("\n{report}");
    if let Some(path) = &args.json {
        Reporter::write_json(&report, path)?;
    }

    teardown.map_err(HarnessError::from)?;
    Ok(report.all_passed())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, finishing in-flight tests");
        stop_clone.store(true, Ordering::Relaxed);
    }) {
        tracing::warn!("error setting ctrl-c handler: {err}");
    }

    match run(&args, &stop) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("wirecheck aborted: {err}");
            eprintln!("wirecheck: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wirecheck_testing::StubServer;

    #[test]
    fn positionals_override_flags_and_config() {
        let args = Args::try_parse_from([
            "wirecheck",
            "--timeout-ms",
            "1500",
            "--only",
            "method",
            "--only",
            "stress",
            "--server",
            "./webserv",
            "--server-config",
            "conf/webserv.conf",
            "example.test",
            "9000",
        ])
        .unwrap();

        let mut loaded = HarnessConfig::default();
        loaded.host = "10.0.0.1".to_owned();
        let config = args.apply(loaded).unwrap();

        assert_eq!(config.host, "example.test");
        assert_eq!(config.port, 9000);
        assert_eq!(config.default_timeout, Duration::from_millis(1500));
        assert_eq!(config.only, ["method", "stress"]);
        let server = config.server.unwrap();
        assert_eq!(server.executable, PathBuf::from("./webserv"));
        assert_eq!(server.config, PathBuf::from("conf/webserv.conf"));
        assert_eq!(server.grace_period, DEFAULT_GRACE_PERIOD);
    }

    #[test]
    fn server_flag_keeps_the_configured_server_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"[server]\nexecutable = \"./old_webserv\"\nconfig = \"conf/webserv.conf\"\ngrace_period_ms = 750\n",
        )
        .unwrap();
        let loaded = HarnessConfig::load(file.path()).unwrap();

        let args = Args::try_parse_from(["wirecheck", "--server", "./webserv"]).unwrap();
        let server = args.apply(loaded).unwrap().server.unwrap();
        assert_eq!(server.executable, PathBuf::from("./webserv"));
        assert_eq!(server.config, PathBuf::from("conf/webserv.conf"));
        assert_eq!(server.grace_period, Duration::from_millis(750));

        let args = Args::try_parse_from(["wirecheck", "--server", "./webserv", "--server-config", "other.conf"]).unwrap();
        let loaded = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(args.apply(loaded).unwrap().server.unwrap().config, PathBuf::from("other.conf"));
    }

    #[test]
    fn server_flag_without_any_config_file_is_rejected() {
        let args = Args::try_parse_from(["wirecheck", "--server", "./webserv"]).unwrap();
        assert!(matches!(
            args.apply(HarnessConfig::default()),
            Err(ConfigError::MissingServerConfig(exe)) if exe == PathBuf::from("./webserv")
        ));
    }

    #[test]
    fn rejects_unknown_categories_and_orphan_server_config() {
        assert!(Args::try_parse_from(["wirecheck", "--only", "speed"]).is_err());
        assert!(Args::try_parse_from(["wirecheck", "--server-config", "a.conf"]).is_err());
    }

    #[test]
    fn listing_never_connects() {
        let args = Args::try_parse_from(["wirecheck", "--list", "127.0.0.1", "1"]).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        assert!(run(&args, &stop).unwrap());
    }

    #[test]
    fn runs_against_an_attached_server() {
        let server = StubServer::start().unwrap();
        let report = tempfile::NamedTempFile::new().unwrap();
        let args = Args::try_parse_from([
            "wirecheck".to_owned(),
            "--only".to_owned(),
            "version".to_owned(),
            "--json".to_owned(),
            report.path().display().to_string(),
            server.host(),
            server.port().to_string(),
        ])
        .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        assert!(run(&args, &stop).unwrap());
        let json = std::fs::read_to_string(report.path()).unwrap();
        assert!(json.contains("\"interrupted\": false"));
    }

    #[test]
    fn interrupted_run_fails() {
        let server = StubServer::start().unwrap();
        let args = Args::try_parse_from([
            "wirecheck".to_owned(),
            "--only".to_owned(),
            "method".to_owned(),
            server.host(),
            server.port().to_string(),
        ])
        .unwrap();

        let stop = Arc::new(AtomicBool::new(true));
        assert!(!run(&args, &stop).unwrap());
    }
}
