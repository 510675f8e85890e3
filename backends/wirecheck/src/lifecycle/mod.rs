//! Lifecycle of the external server under test.
//!
//! WHY: The server is a separate process that must be started before any
//! transaction and must never outlive the harness, whatever way the run ends.
//!
//! WHAT: [`ServerLauncher::start`] spawns `<executable> <config>` and polls the
//! port until it accepts; the returned [`ServerHandle`] owns the child and
//! terminates it on [`ServerHandle::stop`] or when dropped.
//!
//! HOW: Child output is drained on background threads into `tracing`. Stop
//! sends SIGTERM, waits a grace period, then kills.

use std::io::{self, BufRead, BufReader, Read};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::{StartupFailure, TeardownError};
use crate::target::Target;

mod signal;

/// Polling cadence while waiting for the child to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How readiness of a server is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    probe_timeout: Duration,
    interval: Duration,
    startup_timeout: Duration,
    settle: Duration,
}

impl ReadinessPolicy {
    /// Defaults:
    /// - `probe_timeout`: 1s per connection attempt
    /// - `interval`: 500ms between attempts
    /// - `startup_timeout`: 10s overall
    /// - `settle`: no initial delay
    #[must_use]
    pub const fn new() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            interval: Duration::from_millis(500),
            startup_timeout: Duration::from_secs(10),
            settle: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sleeps this long after spawning before the first probe.
    #[must_use]
    pub const fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    #[must_use]
    pub const fn get_probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    #[must_use]
    pub const fn get_interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn get_startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    #[must_use]
    pub const fn get_settle(&self) -> Duration {
        self.settle
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// One short connection attempt against every address of `target`.
#[must_use]
pub fn probe(target: &Target, timeout: Duration) -> bool {
    let Ok(addrs) = target.socket_addrs() else {
        return false;
    };
    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, timeout.max(Duration::from_millis(1))).is_ok())
}

/// Waits for an already running server to accept connections.
///
/// # Errors
///
/// [`StartupFailure::NotReady`] when the startup timeout elapses first.
pub fn wait_until_ready(target: &Target, policy: &ReadinessPolicy) -> Result<Duration, StartupFailure> {
    poll_ready(target, policy, || Ok(()))
}

fn poll_ready<F>(target: &Target, policy: &ReadinessPolicy, mut still_alive: F) -> Result<Duration, StartupFailure>
where
    F: FnMut() -> Result<(), StartupFailure>,
{
    let started = Instant::now();
    if !policy.settle.is_zero() {
        thread::sleep(policy.settle);
    }

    loop {
        still_alive()?;
        if probe(target, policy.probe_timeout) {
            let waited = started.elapsed();
            tracing::info!("{target} accepted a connection after {waited:?}");
            return Ok(waited);
        }
        if started.elapsed() >= policy.startup_timeout {
            return Err(StartupFailure::NotReady {
                addr: target.to_string(),
                waited: started.elapsed(),
            });
        }
        thread::sleep(policy.interval);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Ready,
    Stopped,
}

/// Starts the server under test.
#[derive(Debug, Clone)]
pub struct ServerLauncher {
    executable: PathBuf,
    config: PathBuf,
    target: Target,
    readiness: ReadinessPolicy,
    grace_period: Duration,
}

impl ServerLauncher {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, config: impl Into<PathBuf>, target: Target) -> Self {
        Self {
            executable: executable.into(),
            config: config.into(),
            target,
            readiness: ReadinessPolicy::new(),
            grace_period: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub const fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Time between the graceful request and the forced kill.
    #[must_use]
    pub const fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Spawns the server and blocks until it accepts connections.
    ///
    /// On failure the child is already torn down.
    ///
    /// # Errors
    ///
    /// [`StartupFailure::Spawn`] if the process cannot be started,
    /// [`StartupFailure::ExitedEarly`] if it exits before accepting, and
    /// [`StartupFailure::NotReady`] if the startup timeout elapses.
    pub fn start(&self) -> Result<ServerHandle, StartupFailure> {
        tracing::info!(
            "starting {} {} for {}",
            self.executable.display(),
            self.config.display(),
            self.target
        );

        let mut child = Command::new(&self.executable)
            .arg(&self.config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.extend(drain("stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.extend(drain("stderr", stderr));
        }

        let mut handle = ServerHandle {
            child,
            target: self.target.clone(),
            state: ServerState::Starting,
            grace_period: self.grace_period,
            exit_status: None,
            drains,
        };

        let readiness = {
            let child = &mut handle.child;
            poll_ready(&self.target, &self.readiness, || match child.try_wait() {
                Ok(Some(status)) => Err(StartupFailure::ExitedEarly(status)),
                Ok(None) => Ok(()),
                Err(err) => Err(StartupFailure::Spawn(err)),
            })
        };

        match readiness {
            Ok(_) => {
                handle.state = ServerState::Ready;
                Ok(handle)
            }
            Err(failure) => {
                tracing::error!("server failed to start: {failure}");
                if let Err(err) = handle.stop() {
                    tracing::error!("teardown after failed start: {err}");
                }
                Err(failure)
            }
        }
    }
}

/// Owns the running server process.
pub struct ServerHandle {
    child: Child,
    target: Target,
    state: ServerState,
    grace_period: Duration,
    exit_status: Option<ExitStatus>,
    drains: Vec<thread::JoinHandle<()>>,
}

impl ServerHandle {
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Terminates the process, gracefully first. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError`] when the process could not be killed or
    /// reaped. A failed graceful request falls through to the kill.
    pub fn stop(&mut self) -> Result<Option<ExitStatus>, TeardownError> {
        self.shutdown(signal::request_termination)
    }

    fn shutdown<F>(&mut self, request_termination: F) -> Result<Option<ExitStatus>, TeardownError>
    where
        F: FnOnce(&Child) -> io::Result<bool>,
    {
        if self.state == ServerState::Stopped {
            return Ok(self.exit_status);
        }

        if let Some(status) = self.child.try_wait().map_err(TeardownError::Wait)? {
            return Ok(self.finish(status));
        }

        let signalled = request_termination(&self.child).unwrap_or_else(|err| {
            tracing::warn!("could not signal server {}: {err}, killing", self.pid());
            false
        });
        if signalled {
            let deadline = Instant::now() + self.grace_period;
            while Instant::now() < deadline {
                if let Some(status) = self.child.try_wait().map_err(TeardownError::Wait)? {
                    tracing::info!("server {} exited gracefully: {status}", self.pid());
                    return Ok(self.finish(status));
                }
                thread::sleep(EXIT_POLL_INTERVAL);
            }
            tracing::warn!(
                "server {} still running after {:?}, killing",
                self.pid(),
                self.grace_period
            );
        }

        if let Err(err) = self.child.kill() {
            // It may have exited between the last poll and the kill.
            if self.child.try_wait().map_err(TeardownError::Wait)?.is_none() {
                return Err(TeardownError::Kill(err));
            }
        }
        let status = self.child.wait().map_err(TeardownError::Wait)?;
        Ok(self.finish(status))
    }

    fn finish(&mut self, status: ExitStatus) -> Option<ExitStatus> {
        self.state = ServerState::Stopped;
        self.exit_status = Some(status);
        for drain in self.drains.drain(..) {
            // A grandchild may still hold the pipe open; never block on it.
            if drain.is_finished() {
                let _ = drain.join();
            }
        }
        self.exit_status
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.state != ServerState::Stopped {
            if let Err(err) = self.stop() {
                tracing::error!("failed to stop server {}: {err}", self.pid());
            }
        }
    }
}

fn drain<R>(stream: &'static str, source: R) -> Option<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("server-{stream}"))
        .spawn(move || {
            let mut reader = BufReader::new(source);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => tracing::debug!("server {stream}: {}", String::from_utf8_lossy(&line).trim_end()),
                }
            }
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!("could not drain server {stream}: {err}");
            None
        }
    }
}
