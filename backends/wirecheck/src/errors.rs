//! Error types shared across the harness.
//!
//! Transaction level failures ([`ConnectionError`], [`ParseFailure`]) are values
//! that end up inside a [`crate::TestResult`]. Only [`StartupFailure`],
//! [`TeardownError`] and configuration/report failures ever abort a run.

use core::fmt;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use derive_more::From;

use crate::config::ConfigError;

/// Reason a transaction produced no usable byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionErrorKind {
    Timeout,
    Refused,
    Reset,
    Empty,
    Unresolved,
    Io,
}

impl ConnectionErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::Reset => "reset",
            Self::Empty => "empty",
            Self::Unresolved => "unresolved",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<io::ErrorKind> for ConnectionErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::ConnectionRefused => Self::Refused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::Reset,
            _ => Self::Io,
        }
    }
}

/// A socket level failure captured as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    message: String,
}

impl ConnectionError {
    #[must_use]
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The live connection returned zero bytes.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(
            ConnectionErrorKind::Empty,
            "connection closed without response bytes",
        )
    }

    #[must_use]
    pub const fn kind(&self) -> ConnectionErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        Self::new(error.kind().into(), error.to_string())
    }
}

impl std::error::Error for ConnectionError {}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}: {}", self.kind, self.message)
    }
}

/// Returned by the parser only for degenerate input.
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum ParseFailure {
    Empty,
    Transport(ConnectionError),
}

impl std::error::Error for ParseFailure {}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, From)]
pub enum StartupFailure {
    Spawn(io::Error),

    #[from(ignore)]
    ExitedEarly(ExitStatus),

    #[from(ignore)]
    NotReady { addr: String, waited: Duration },
}

impl std::error::Error for StartupFailure {}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug)]
pub enum TeardownError {
    Wait(io::Error),
    Kill(io::Error),
}

impl std::error::Error for TeardownError {}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Errors that abort a whole harness run.
#[derive(Debug, From)]
pub enum HarnessError {
    Startup(StartupFailure),
    Teardown(TeardownError),
    Config(ConfigError),

    #[from(ignore)]
    ReportWrite(io::Error),

    ReportEncode(serde_json::Error),
}

impl std::error::Error for HarnessError {}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
