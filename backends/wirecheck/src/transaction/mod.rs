//! Raw byte level transactions.
//!
//! WHY: Most of the conformance corpus sends bytes no HTTP client library would
//! emit, so requests are plain byte buffers written straight to a socket.
//!
//! WHAT: [`TransactionSpec`] describes what to send and how; [`RawTransactionEngine`]
//! performs exactly one connect/write/read cycle per call.
//!
//! HOW: Blocking `std::net` sockets with read/write timeouts. The only blocking
//! points are the inter-fragment sleeps and the single bounded read.

use std::time::Duration;

mod engine;

pub use engine::{execute, RawTransactionEngine, RECEIVE_BUFFER_SIZE};

/// How the request bytes leave the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// One write.
    Whole(Vec<u8>),
    /// Several writes; `delays[i]` is slept after `fragments[i]` unless it is the last one.
    Fragmented {
        fragments: Vec<Vec<u8>>,
        delays: Vec<Duration>,
    },
}

impl Delivery {
    #[must_use]
    pub fn fragments(&self) -> Vec<&[u8]> {
        match self {
            Self::Whole(bytes) => vec![bytes.as_slice()],
            Self::Fragmented { fragments, .. } => fragments.iter().map(Vec::as_slice).collect(),
        }
    }

    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        match self {
            Self::Whole(_) => &[],
            Self::Fragmented { delays, .. } => delays,
        }
    }

    /// All bytes that will be written, concatenated.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        self.fragments().concat()
    }
}

/// What one descriptor sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSpec {
    delivery: Delivery,
    timeout: Option<Duration>,
    port_offset: u16,
}

impl TransactionSpec {
    #[must_use]
    pub fn whole(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery: Delivery::Whole(bytes.into()),
            timeout: None,
            port_offset: 0,
        }
    }

    #[must_use]
    pub fn fragmented(fragments: Vec<Vec<u8>>, delays: Vec<Duration>) -> Self {
        Self {
            delivery: Delivery::Fragmented { fragments, delays },
            timeout: None,
            port_offset: 0,
        }
    }

    /// Overrides the run wide timeout for this transaction.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout in seconds.
    #[must_use]
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    /// Targets `port + offset` instead of the run's port.
    #[must_use]
    pub fn port_offset(mut self, offset: u16) -> Self {
        self.port_offset = offset;
        self
    }

    #[must_use]
    pub const fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    #[must_use]
    pub const fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub const fn get_port_offset(&self) -> u16 {
        self.port_offset
    }
}
