use core::fmt;

use crate::errors::{ConnectionError, ParseFailure};
use crate::parser::{self, ParsedResponse};

/// Exactly one of a parsed response or a connection error, per transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Response(ParsedResponse),
    Failure(ConnectionError),
}

impl Observation {
    /// Folds a raw transaction outcome; zero bytes becomes an `empty` connection error.
    #[must_use]
    pub fn from_transaction(outcome: Result<Vec<u8>, ConnectionError>) -> Self {
        match parser::parse_outcome(outcome) {
            Ok(response) => Self::Response(response),
            Err(ParseFailure::Empty) => Self::Failure(ConnectionError::empty()),
            Err(ParseFailure::Transport(error)) => Self::Failure(error),
        }
    }

    #[must_use]
    pub const fn response(&self) -> Option<&ParsedResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&ConnectionError> {
        match self {
            Self::Failure(error) => Some(error),
            Self::Response(_) => None,
        }
    }

    /// The literal status line, or the error message, for reports.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Response(response) => response
                .status_line()
                .map_or_else(|| "<no status line>".to_owned(), str::to_owned),
            Self::Failure(error) => error.to_string(),
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConnectionErrorKind;

    #[test]
    fn zero_bytes_is_an_empty_failure() {
        let observation = Observation::from_transaction(Ok(Vec::new()));
        assert_eq!(
            observation.failure().map(ConnectionError::kind),
            Some(ConnectionErrorKind::Empty)
        );
        assert!(observation.response().is_none());
    }

    #[test]
    fn bytes_become_a_response() {
        let observation = Observation::from_transaction(Ok(b"HTTP/1.1 400 Bad Request\r\n\r\n".to_vec()));
        assert_eq!(observation.summary(), "HTTP/1.1 400 Bad Request");
        assert!(observation.failure().is_none());
    }

    #[test]
    fn transport_errors_pass_through() {
        let error = ConnectionError::new(ConnectionErrorKind::Timeout, "timed out");
        let observation = Observation::from_transaction(Err(error.clone()));
        assert_eq!(observation, Observation::Failure(error));
        assert_eq!(observation.summary(), "ERROR: timeout: timed out");
    }
}
