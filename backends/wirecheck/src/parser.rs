//! Tolerant HTTP response parsing.
//!
//! The parser is total over non-empty input: whatever the server emitted is
//! turned into a best-effort [`ParsedResponse`] with a `well_formed` flag, and
//! judging it is left to the expectation rules.

use std::collections::HashMap;

use crate::errors::{ConnectionError, ParseFailure};
use crate::latin1;

pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
pub const LINE_TERMINATOR: &str = "\r\n";

/// Structured view of a response byte stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    status_line: Option<String>,
    headers: HashMap<String, String>,
    body: String,
    well_formed: bool,
    has_body_delimiter: bool,
    non_conformant_lines: Vec<String>,
}

impl ParsedResponse {
    /// First line of the header block, verbatim. `None` when that line is empty.
    #[must_use]
    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    /// Headers exactly as received; a repeated name keeps its last value.
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Case-insensitive lookup, for rules that fold header names.
    #[must_use]
    pub fn header_ci(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Bytes after the header block, one char per byte.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    #[must_use]
    pub const fn has_body_delimiter(&self) -> bool {
        self.has_body_delimiter
    }

    /// Header lines that had no colon.
    #[must_use]
    pub fn non_conformant_lines(&self) -> &[String] {
        &self.non_conformant_lines
    }

    /// First token of the status line, e.g. `HTTP/1.1`.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.status_line()?.split_whitespace().next()
    }

    /// Second token of the status line parsed as a number.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status_line()?.split_whitespace().nth(1)?.parse().ok()
    }
}

/// Parses a raw response.
///
/// # Errors
///
/// [`ParseFailure::Empty`] for zero bytes. Any other input parses.
pub fn parse(bytes: &[u8]) -> Result<ParsedResponse, ParseFailure> {
    if bytes.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let (head, body, has_body_delimiter) = match find(bytes, HEADER_TERMINATOR) {
        Some(at) => (&bytes[..at], &bytes[at + HEADER_TERMINATOR.len()..], true),
        None => (bytes, &[][..], false),
    };

    let head = latin1::decode(head);
    let mut lines = head.split(LINE_TERMINATOR);
    let status_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .map(str::to_owned);

    let mut headers = HashMap::new();
    let mut non_conformant_lines = Vec::new();
    for line in lines.filter(|line| !line.is_empty()) {
        match line.split_once(':') {
            Some((name, value)) => {
                headers.insert(name.trim().to_owned(), value.trim().to_owned());
            }
            None => non_conformant_lines.push(line.to_owned()),
        }
    }

    let well_formed = has_body_delimiter
        && non_conformant_lines.is_empty()
        && status_line
            .as_deref()
            .is_some_and(|line| line.starts_with("HTTP/"));

    Ok(ParsedResponse {
        status_line,
        headers,
        body: latin1::decode(body),
        well_formed,
        has_body_delimiter,
        non_conformant_lines,
    })
}

/// Parses a transaction outcome; transport errors pass through as [`ParseFailure::Transport`].
///
/// # Errors
///
/// See [`parse`].
pub fn parse_outcome(outcome: Result<Vec<u8>, ConnectionError>) -> Result<ParsedResponse, ParseFailure> {
    parse(&outcome?)
}

/// Position of the first occurrence of `needle` in `haystack`.
#[must_use]
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConnectionErrorKind;

    #[test]
    fn find_reports_the_first_match() {
        assert_eq!(find(b"a\r\n\r\nb\r\n\r\n", b"\r\n\r\n"), Some(1));
        assert_eq!(find(b"HTTP/1.1 200 OK\r\n", b"\r\n\r\n"), None);
        assert_eq!(find(b"", b"\r\n"), None);
    }

    #[test]
    fn parses_a_regular_response() {
        let response = parse(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 5\r\nServer:  demo \r\n\r\nnope!",
        )
        .unwrap();

        assert_eq!(response.status_line(), Some("HTTP/1.1 404 Not Found"));
        assert_eq!(response.status_code(), Some(404));
        assert_eq!(response.version(), Some("HTTP/1.1"));
        assert_eq!(response.header("Content-Length"), Some("5"));
        assert_eq!(response.header("Server"), Some("demo"));
        assert_eq!(response.body(), "nope!");
        assert!(response.is_well_formed());
    }

    #[test]
    fn header_names_keep_their_case() {
        let response = parse(b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\r\n").unwrap();
        assert_eq!(response.header("Content-Type"), None);
        assert_eq!(response.header_ci("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn missing_delimiter_is_all_header_block() {
        let response = parse(b"HTTP/1.1 200 OK\r\nX-A: b").unwrap();
        assert_eq!(response.header("X-A"), Some("b"));
        assert_eq!(response.body(), "");
        assert!(!response.has_body_delimiter());
        assert!(!response.is_well_formed());
    }

    #[test]
    fn lines_without_colon_are_recorded_not_fatal() {
        let response = parse(b"HTTP/1.1 200 OK\r\nbroken line\r\nX-Ok: 1\r\n\r\n").unwrap();
        assert_eq!(response.non_conformant_lines(), ["broken line".to_string()]);
        assert_eq!(response.header("X-Ok"), Some("1"));
        assert!(!response.is_well_formed());
    }

    #[test]
    fn value_splits_on_first_colon_only() {
        let response = parse(b"HTTP/1.1 301 Moved\r\nLocation: http://a:80/b\r\n\r\n").unwrap();
        assert_eq!(response.header("Location"), Some("http://a:80/b"));
    }

    #[test]
    fn later_duplicates_overwrite() {
        let response = parse(b"HTTP/1.1 200 OK\r\nX-Dup: 1\r\nX-Dup: 2\r\n\r\n").unwrap();
        assert_eq!(response.header("X-Dup"), Some("2"));
    }

    #[test]
    fn garbage_still_parses() {
        let response = parse(b"\x00\xff garbage").unwrap();
        assert_eq!(response.status_line(), Some("\u{0}\u{ff} garbage"));
        assert_eq!(response.status_code(), None);
        assert!(!response.is_well_formed());

        let only_delimiter = parse(b"\r\n\r\nbody").unwrap();
        assert_eq!(only_delimiter.status_line(), None);
        assert_eq!(only_delimiter.body(), "body");
    }

    #[test]
    fn body_bytes_map_one_to_one() {
        let response = parse(b"HTTP/1.1 200 OK\r\n\r\n\x00\x80\xff").unwrap();
        assert_eq!(response.body().chars().map(u32::from).collect::<Vec<_>>(), [0, 0x80, 0xff]);
    }

    #[test]
    fn empty_and_transport_errors_fail() {
        assert_eq!(parse(b""), Err(ParseFailure::Empty));

        let error = ConnectionError::new(ConnectionErrorKind::Reset, "reset");
        assert_eq!(
            parse_outcome(Err(error.clone())),
            Err(ParseFailure::Transport(error))
        );
    }
}
