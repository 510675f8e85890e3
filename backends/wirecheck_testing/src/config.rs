//! Configuration for the `stub_webserv` binary.
//!
//! The format is a tiny nginx-like subset: `;` terminated statements, `#`
//! comments, and braces that are ignored. Only three statements mean anything:
//!
//! ```text
//! server {
//!     listen 127.0.0.1:8080;
//!     startup_delay 250;   # milliseconds before binding
//!     ignore_term;         # keep running after SIGTERM
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use derive_more::From;

#[derive(Debug, From)]
pub enum StubConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    MissingListen,

    #[from(ignore)]
    InvalidListen(String),

    #[from(ignore)]
    InvalidDelay(String),
}

impl From<std::io::Error> for StubConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for StubConfigError {}

impl core::fmt::Display for StubConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubConfig {
    pub listen: String,
    pub startup_delay: Duration,
    pub ignore_term: bool,
}

impl StubConfig {
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self, StubConfigError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// # Errors
    ///
    /// A missing or malformed `listen` and a non-numeric delay are rejected.
    pub fn parse(source: &str) -> Result<Self, StubConfigError> {
        let mut listen = None;
        let mut startup_delay = Duration::ZERO;
        let mut ignore_term = false;

        let stripped: String = source
            .lines()
            .map(|line| line.split_once('#').map_or(line, |(code, _)| code))
            .collect::<Vec<_>>()
            .join("\n")
            .replace(['{', '}'], ";");

        for statement in stripped.split(';') {
            let mut words = statement.split_whitespace();
            match (words.next(), words.next()) {
                (Some("listen"), Some(addr)) => listen = Some(validate_listen(addr)?),
                (Some("listen"), None) => return Err(StubConfigError::InvalidListen(String::new())),
                (Some("startup_delay"), value) => {
                    let value = value.unwrap_or_default();
                    let millis = value
                        .parse()
                        .map_err(|_| StubConfigError::InvalidDelay(value.to_owned()))?;
                    startup_delay = Duration::from_millis(millis);
                }
                (Some("ignore_term"), _) => ignore_term = true,
                _ => {}
            }
        }

        Ok(Self {
            listen: listen.ok_or(StubConfigError::MissingListen)?,
            startup_delay,
            ignore_term,
        })
    }
}

/// Accepts `host:port` or a bare port, which binds localhost.
fn validate_listen(addr: &str) -> Result<String, StubConfigError> {
    let full = if addr.contains(':') {
        addr.to_owned()
    } else {
        format!("127.0.0.1:{addr}")
    };
    match full.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(full),
        _ => Err(StubConfigError::InvalidListen(addr.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_server_block() {
        let config = StubConfig::parse(
            "server {\n  listen 127.0.0.1:8081; # main\n  startup_delay 250;\n  ignore_term;\n}\n",
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:8081");
        assert_eq!(config.startup_delay, Duration::from_millis(250));
        assert!(config.ignore_term);
    }

    #[test]
    fn bare_port_binds_localhost() {
        let config = StubConfig::parse("listen 9000;").unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert!(!config.ignore_term);
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(StubConfig::parse("server {}"), Err(StubConfigError::MissingListen)));
        assert!(matches!(
            StubConfig::parse("listen localhost:http;"),
            Err(StubConfigError::InvalidListen(_))
        ));
        assert!(matches!(
            StubConfig::parse("listen 80; startup_delay soon;"),
            Err(StubConfigError::InvalidDelay(value)) if value == "soon"
        ));
    }
}
