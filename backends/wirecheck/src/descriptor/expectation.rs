//! Conformance predicates.
//!
//! An [`Expectation`] has two halves because a dropped connection is a valid
//! answer to a broken request but never to a well-formed one. Each descriptor
//! states both halves explicitly.

use crate::errors::{ConnectionError, ConnectionErrorKind};
use crate::observation::Observation;
use crate::parser::ParsedResponse;

/// Rule applied when the server answered with bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseRule {
    Any,
    StatusLineExists,
    /// Status line starts with the token, e.g. `HTTP/1.1`.
    VersionPrefix(String),
    /// Status line contains the token anywhere.
    ContainsVersion(String),
    /// Parsed status code is one of the set.
    StatusIn(Vec<u16>),
    ClientError,
    /// `HTTP/1.x <code> <reason>` shape.
    WellFormedStatusLine,
    StatusCodeInRange(u16, u16),
    /// At least one of the names is present, compared case-insensitively.
    HeaderPresent(Vec<String>),
    /// Body does not contain the needle, compared case-insensitively.
    BodyExcludes(String),
    WellFormed,
    All(Vec<ResponseRule>),
}

impl ResponseRule {
    /// `Ok` when the response satisfies the rule, otherwise the reason it does not.
    ///
    /// # Errors
    ///
    /// Returns a human readable mismatch description.
    pub fn check(&self, response: &ParsedResponse) -> Result<(), String> {
        let status_line = response.status_line().unwrap_or_default();
        match self {
            Self::Any => Ok(()),
            Self::StatusLineExists => response
                .status_line()
                .map(|_| ())
                .ok_or_else(|| "no status line".to_owned()),
            Self::VersionPrefix(version) => {
                require(status_line.starts_with(version.as_str()), || {
                    format!("status line does not start with {version}")
                })
            }
            Self::ContainsVersion(version) => {
                require(status_line.contains(version.as_str()), || {
                    format!("status line does not contain {version}")
                })
            }
            Self::StatusIn(codes) => match response.status_code() {
                Some(code) if codes.contains(&code) => Ok(()),
                Some(code) => Err(format!("status {code} not in {}", join_codes(codes))),
                None => Err("no parseable status code".to_owned()),
            },
            Self::ClientError => match response.status_code() {
                Some(400..=499) => Ok(()),
                Some(code) => Err(format!("status {code} is not a client error")),
                None => Err("no parseable status code".to_owned()),
            },
            Self::WellFormedStatusLine => require(
                status_line.starts_with("HTTP/1.") && status_line.split_whitespace().count() >= 3,
                || "status line is not `HTTP/1.x <code> <reason>`".to_owned(),
            ),
            Self::StatusCodeInRange(low, high) => match response.status_code() {
                Some(code) if (*low..=*high).contains(&code) => Ok(()),
                Some(code) => Err(format!("status {code} outside {low}-{high}")),
                None => Err("no parseable status code".to_owned()),
            },
            Self::HeaderPresent(names) => require(
                names.iter().any(|name| response.header_ci(name).is_some()),
                || format!("none of {} present", names.join(", ")),
            ),
            Self::BodyExcludes(needle) => require(
                !response
                    .body()
                    .to_ascii_lowercase()
                    .contains(&needle.to_ascii_lowercase()),
                || format!("body leaks {needle:?}"),
            ),
            Self::WellFormed => require(response.is_well_formed(), || {
                "response framing is not well-formed".to_owned()
            }),
            Self::All(rules) => rules.iter().try_for_each(|rule| rule.check(response)),
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any response".to_owned(),
            Self::StatusLineExists => "status line present".to_owned(),
            Self::VersionPrefix(version) => format!("{version} status line"),
            Self::ContainsVersion(version) => format!("status line containing {version}"),
            Self::StatusIn(codes) => join_codes(codes),
            Self::ClientError => "4xx".to_owned(),
            Self::WellFormedStatusLine => "HTTP/1.x <code> <reason>".to_owned(),
            Self::StatusCodeInRange(low, high) => format!("status {low}-{high}"),
            Self::HeaderPresent(names) => format!("{} header", names.join(" or ")),
            Self::BodyExcludes(needle) => format!("body without {needle:?}"),
            Self::WellFormed => "well-formed framing".to_owned(),
            Self::All(rules) => rules
                .iter()
                .map(Self::describe)
                .collect::<Vec<_>>()
                .join(" and "),
        }
    }
}

/// What a connection level failure means for a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePolicy {
    Reject,
    Accept,
    AcceptKinds(Vec<ConnectionErrorKind>),
}

impl FailurePolicy {
    #[must_use]
    pub fn accepts(&self, error: &ConnectionError) -> bool {
        match self {
            Self::Reject => false,
            Self::Accept => true,
            Self::AcceptKinds(kinds) => kinds.contains(&error.kind()),
        }
    }

    fn describe_suffix(&self) -> String {
        match self {
            Self::Reject => String::new(),
            Self::Accept => " or connection error".to_owned(),
            Self::AcceptKinds(kinds) => format!(
                " or connection {}",
                kinds
                    .iter()
                    .map(ConnectionErrorKind::as_str)
                    .collect::<Vec<_>>()
                    .join("/")
            ),
        }
    }
}

/// Outcome of judging one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    pub notes: Option<String>,
}

/// A conformance predicate over either half of an [`Observation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    on_response: ResponseRule,
    on_failure: FailurePolicy,
}

impl Expectation {
    #[must_use]
    pub const fn new(on_response: ResponseRule, on_failure: FailurePolicy) -> Self {
        Self {
            on_response,
            on_failure,
        }
    }

    /// Requires a response satisfying `rule`; connection errors fail.
    #[must_use]
    pub const fn response(rule: ResponseRule) -> Self {
        Self::new(rule, FailurePolicy::Reject)
    }

    /// Requires one of `codes`; connection errors fail.
    #[must_use]
    pub fn status(codes: &[u16]) -> Self {
        Self::response(ResponseRule::StatusIn(codes.to_vec()))
    }

    /// Any connection error also passes.
    #[must_use]
    pub fn or_connection_error(mut self) -> Self {
        self.on_failure = FailurePolicy::Accept;
        self
    }

    /// Connection errors of the given kinds also pass.
    #[must_use]
    pub fn or_connection_error_of(mut self, kinds: &[ConnectionErrorKind]) -> Self {
        self.on_failure = FailurePolicy::AcceptKinds(kinds.to_vec());
        self
    }

    #[must_use]
    pub const fn on_response(&self) -> &ResponseRule {
        &self.on_response
    }

    #[must_use]
    pub const fn on_failure(&self) -> &FailurePolicy {
        &self.on_failure
    }

    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}{}",
            self.on_response.describe(),
            self.on_failure.describe_suffix()
        )
    }

    #[must_use]
    pub fn evaluate(&self, observation: &Observation) -> Evaluation {
        match observation {
            Observation::Response(response) => match self.on_response.check(response) {
                Ok(()) => Evaluation {
                    passed: true,
                    notes: None,
                },
                Err(reason) => Evaluation {
                    passed: false,
                    notes: Some(reason),
                },
            },
            Observation::Failure(error) if self.on_failure.accepts(error) => Evaluation {
                passed: true,
                notes: Some(format!("connection {} accepted", error.kind())),
            },
            Observation::Failure(error) => Evaluation {
                passed: false,
                notes: Some(format!("unexpected connection {}", error.kind())),
            },
        }
    }
}

fn require(condition: bool, reason: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(reason())
    }
}

fn join_codes(codes: &[u16]) -> String {
    codes
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn respond(raw: &[u8]) -> Observation {
        Observation::Response(parse(raw).unwrap())
    }

    fn fail(kind: ConnectionErrorKind) -> Observation {
        Observation::Failure(ConnectionError::new(kind, "x"))
    }

    #[test]
    fn status_sets_match_parsed_codes() {
        let expectation = Expectation::status(&[400, 411]);
        assert!(expectation.evaluate(&respond(b"HTTP/1.1 411 Length Required\r\n\r\n")).passed);

        let verdict = expectation.evaluate(&respond(b"HTTP/1.1 200 OK 400\r\n\r\n"));
        assert!(!verdict.passed);
        assert_eq!(verdict.notes.as_deref(), Some("status 200 not in 400/411"));
    }

    #[test]
    fn failure_asymmetry_is_per_expectation() {
        let strict = Expectation::status(&[200]);
        let lenient = Expectation::status(&[400]).or_connection_error();
        let timeouts_only = Expectation::status(&[408])
            .or_connection_error_of(&[ConnectionErrorKind::Timeout]);

        assert!(!strict.evaluate(&fail(ConnectionErrorKind::Reset)).passed);
        assert!(lenient.evaluate(&fail(ConnectionErrorKind::Reset)).passed);
        assert!(timeouts_only.evaluate(&fail(ConnectionErrorKind::Timeout)).passed);
        assert!(!timeouts_only.evaluate(&fail(ConnectionErrorKind::Refused)).passed);
    }

    #[test]
    fn descriptions_read_naturally() {
        assert_eq!(Expectation::status(&[400, 411]).or_connection_error().describe(), "400/411 or connection error");
        assert_eq!(
            Expectation::status(&[400, 408])
                .or_connection_error_of(&[ConnectionErrorKind::Timeout, ConnectionErrorKind::Reset])
                .describe(),
            "400/408 or connection timeout/reset"
        );
        let combined = ResponseRule::All(vec![
            ResponseRule::ContainsVersion("HTTP/1.1".into()),
            ResponseRule::BodyExcludes("root:x:0:0".into()),
        ]);
        assert_eq!(combined.describe(), "status line containing HTTP/1.1 and body without \"root:x:0:0\"");
    }

    #[test]
    fn body_and_header_rules_fold_case() {
        let observation = respond(b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nROOT:X:0:0:");
        let leak = Expectation::response(ResponseRule::BodyExcludes("root:x:0:0".into()));
        let framed = Expectation::response(ResponseRule::HeaderPresent(vec![
            "Content-Length".into(),
            "Transfer-Encoding".into(),
        ]));

        assert!(!leak.evaluate(&observation).passed);
        assert!(framed.evaluate(&observation).passed);
    }

    #[test]
    fn shape_rules() {
        let good = respond(b"HTTP/1.0 503 Service Unavailable\r\n\r\n");
        let bad = respond(b"HTTP/1.1 200\r\n\r\n");
        let rule = Expectation::response(ResponseRule::WellFormedStatusLine);
        assert!(rule.evaluate(&good).passed);
        assert!(!rule.evaluate(&bad).passed);

        let range = Expectation::response(ResponseRule::StatusCodeInRange(100, 599));
        assert!(range.evaluate(&good).passed);
        assert!(!range.evaluate(&respond(b"HTTP/1.1 999 Nope\r\n\r\n")).passed);

        let client = Expectation::response(ResponseRule::ClientError);
        assert!(client.evaluate(&respond(b"HTTP/1.1 418 Teapot\r\n\r\n")).passed);
        assert!(!client.evaluate(&good).passed);
    }
}
