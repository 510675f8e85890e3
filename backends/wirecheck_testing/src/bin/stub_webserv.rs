//! Standalone server answering with the reference responder.
//!
//! Usage: `stub_webserv <config-file>`. Exits with status 2 when the
//! configuration is unusable and 1 when the listen address cannot be bound.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use wirecheck_testing::{reference, StubConfig, StubServer};

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        tracing::error!("usage: stub_webserv <config-file>");
        return ExitCode::from(2);
    };

    let config = match StubConfig::load(&path) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid configuration {}: {err}", path.display());
            return ExitCode::from(2);
        }
    };

    if config.ignore_term {
        ignore_termination();
    }
    if !config.startup_delay.is_zero() {
        tracing::info!("delaying startup by {:?}", config.startup_delay);
        std::thread::sleep(config.startup_delay);
    }

    match StubServer::bind(&config.listen, Arc::new(reference::respond)) {
        Ok(server) => {
            tracing::info!("serving on {}", server.addr());
            server.wait();
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("cannot listen on {}: {err}", config.listen);
            ExitCode::from(1)
        }
    }
}

#[cfg(unix)]
fn ignore_termination() {
    tracing::info!("ignoring SIGTERM");
    // SAFETY: installs the predefined SIG_IGN disposition, no handler code runs.
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_termination() {
    tracing::warn!("ignore_term has no effect on this platform");
}
