use core::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// The `(host, port)` pair a transaction is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Same host, port shifted by `offset` (saturating).
    #[must_use]
    pub fn offset(&self, offset: u16) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port.saturating_add(offset),
        }
    }

    /// Resolves the target into every socket address it names.
    ///
    /// # Errors
    ///
    /// Propagates resolver failures.
    pub fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new("127.0.0.1", 8080)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
