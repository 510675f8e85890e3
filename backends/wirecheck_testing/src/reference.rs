//! A strict reference responder.
//!
//! WHY: The harness needs a server whose answer to every registry row is known,
//! so end-to-end runs can assert on pass rates without a real web server.
//!
//! WHAT: [`respond`] maps one raw request to one [`StubReply`]; [`progress`]
//! tells a connection loop whether enough bytes have arrived to answer.
//!
//! HOW: The request head is decoded byte-for-char and checked in a fixed order.
//! The first rule a request breaks decides the status code.

use core::fmt;

use encoding_rs::mem;
use wirecheck::parser::find;

/// Largest request body accepted before answering 413.
pub const MAX_BODY: u64 = 1024 * 1024;

const HEAD_END: &[u8] = b"\r\n\r\n";

const ALLOWED_METHODS: [&str; 4] = ["GET", "HEAD", "POST", "DELETE"];
const KNOWN_METHODS: [&str; 5] = ["PUT", "PATCH", "OPTIONS", "TRACE", "CONNECT"];

const INDEX_PAGE: &str = "<html><body><h1>It works</h1></body></html>\n";
const TEXT_FILE: &str = "plain text fixture\n";
const LISTING: &str = "<html><body><ul><li>index.html</li><li>test.txt</li></ul></body></html>\n";

/// One rendered HTTP/1.1 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubReply {
    status: u16,
    reason: &'static str,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl StubReply {
    /// An empty-bodied reply with the standard reason phrase.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: reason_phrase(status),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.with_header("Content-Type", content_type)
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drops the body but keeps its advertised length, as a HEAD reply does.
    #[must_use]
    pub fn without_body(mut self) -> Self {
        let length = self.body.len().to_string();
        self.body.clear();
        self.with_header("Content-Length", &length)
    }

    /// Renders the reply, always closing the connection afterwards.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        let has_length = self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("Content-Length"));
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        if !has_length {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

impl fmt::Display for StubReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.reason)
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

/// How much of a request has been buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NeedHead,
    NeedBody,
    Complete,
}

/// Whether `buffer` already holds a full request.
///
/// A head with an unusable or oversized `Content-Length` is complete, since
/// the answer will not depend on the body.
#[must_use]
pub fn progress(buffer: &[u8]) -> Progress {
    let Some(head_len) = find(buffer, HEAD_END) else {
        return Progress::NeedHead;
    };
    let head = mem::decode_latin1(&buffer[..head_len]);
    let received = (buffer.len() - head_len - HEAD_END.len()) as u64;

    match declared_lengths(&head).as_slice() {
        [Some(declared)] if *declared <= MAX_BODY && received < *declared => Progress::NeedBody,
        _ => Progress::Complete,
    }
}

/// Answers one raw request.
#[must_use]
pub fn respond(request: &[u8]) -> StubReply {
    match judge(request) {
        Ok(reply) | Err(reply) => reply,
    }
}

fn judge(request: &[u8]) -> Result<StubReply, StubReply> {
    let bad = || StubReply::new(400);

    let head_len = find(request, HEAD_END).ok_or_else(bad)?;
    let head = mem::decode_latin1(&request[..head_len]);
    let body = &request[head_len + HEAD_END.len()..];

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    if request_line.contains('\n') {
        return Err(bad());
    }

    let tokens: Vec<&str> = request_line.split(' ').collect();
    let [method, target, version] = tokens.as_slice() else {
        return Err(bad());
    };
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(bad());
    }
    if !(target.starts_with('/') || *target == "*") || target.chars().any(char::is_control) {
        return Err(bad());
    }
    if !matches!(*version, "HTTP/1.1" | "HTTP/1.0") {
        return Err(bad());
    }

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or_else(bad)?;
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(bad());
        }
        headers.push((name, value.trim()));
    }

    let hosts = headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("Host"))
        .count();
    if hosts != 1 {
        return Err(bad());
    }

    let declared = match declared_lengths(&head).as_slice() {
        [] => None,
        [Some(length)] => Some(*length),
        _ => return Err(bad()),
    };
    if let Some(length) = declared {
        if length > MAX_BODY {
            return Err(StubReply::new(413));
        }
        if (body.len() as u64) < length {
            return Err(bad());
        }
    }

    if !ALLOWED_METHODS.contains(method) {
        let status = if KNOWN_METHODS.contains(method) { 405 } else { 501 };
        return Err(StubReply::new(status));
    }

    let path = normalize(target).ok_or_else(bad)?;
    let resource = Resource::lookup(&path).ok_or_else(|| StubReply::new(404))?;

    if *method == "POST" && declared.is_none() {
        return Err(StubReply::new(411));
    }

    Ok(resource.answer(method))
}

/// Every parsable `Content-Length` value, `None` for ones that are not digits.
fn declared_lengths(head: &str) -> Vec<Option<u64>> {
    head.split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, value)| {
            let value = value.trim();
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // Too many digits for a u64 is still a well formed length, just too large.
            Some(value.parse().unwrap_or(u64::MAX))
        })
        .collect()
}

/// Resolves dot segments after percent-decoding; `None` when the path climbs above `/`.
fn normalize(target: &str) -> Option<String> {
    if target == "*" {
        return Some("*".to_owned());
    }
    let raw = target.split_once('?').map_or(target, |(path, _)| path);
    let decoded = percent_decode(raw);

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    let mut path = format!("/{}", segments.join("/"));
    if decoded.ends_with('/') && path.len() > 1 {
        path.push('/');
    }
    Some(path)
}

fn percent_decode(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut decoded = String::with_capacity(chars.len());
    let mut index = 0;
    while index < chars.len() {
        if chars[index] == '%' && index + 2 < chars.len() {
            let escaped = chars[index + 1]
                .to_digit(16)
                .zip(chars[index + 2].to_digit(16))
                .and_then(|(high, low)| u8::try_from(high * 16 + low).ok());
            if let Some(byte) = escaped {
                decoded.push(char::from(byte));
                index += 3;
                continue;
            }
        }
        decoded.push(chars[index]);
        index += 1;
    }
    decoded
}

enum Resource {
    Index,
    TextFile,
    Uploads,
    Any,
}

impl Resource {
    fn lookup(path: &str) -> Option<Self> {
        match path {
            "/" | "/index.html" => Some(Self::Index),
            "/test.txt" => Some(Self::TextFile),
            "/uploads" | "/uploads/" => Some(Self::Uploads),
            "*" => Some(Self::Any),
            _ => None,
        }
    }

    fn answer(&self, method: &str) -> StubReply {
        match (method, self) {
            ("POST", Self::Uploads) => StubReply::new(201).with_header("Location", "/uploads/upload.bin"),
            ("POST", _) => StubReply::new(200).with_body("text/plain", "received\n"),
            ("DELETE", Self::TextFile) => StubReply::new(204),
            ("DELETE", _) => StubReply::new(405).with_header("Allow", "GET, HEAD, POST"),
            ("HEAD", resource) => resource.page().without_body(),
            (_, resource) => resource.page(),
        }
    }

    fn page(&self) -> StubReply {
        match self {
            Self::Index | Self::Any => StubReply::new(200).with_body("text/html", INDEX_PAGE),
            Self::TextFile => StubReply::new(200).with_body("text/plain", TEXT_FILE),
            Self::Uploads => StubReply::new(200).with_body("text/html", LISTING),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use wirecheck::latin1::decode;

    fn status_of(raw: &[u8]) -> u16 {
        respond(raw).status()
    }

    #[test]
    fn serves_known_paths() {
        assert_eq!(status_of(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"), 200);
        assert_eq!(status_of(b"GET /test.txt HTTP/1.0\r\nhost: x\r\n\r\n"), 200);
        assert_eq!(status_of(b"GET /nonexistent HTTP/1.1\r\nHost: x\r\n\r\n"), 404);
        assert_eq!(status_of(b"GET /path/../index.html?x=1 HTTP/1.1\r\nHost: x\r\n\r\n"), 200);
    }

    #[test]
    fn rejects_broken_request_lines() {
        for raw in [
            &b"GET / HTTP/1.1\r\n\r\n"[..],
            b"GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n",
            b"   GET / HTTP/1.1\r\nHost: x\r\n\r\n",
            b"GET /\0path HTTP/1.1\r\nHost: x\r\n\r\n",
            b"GET / HTTP/1.1\nHost: x\r\n\r\n",
            b"get / HTTP/1.1\r\nHost: x\r\n\r\n",
            b"GET / HTTP/2.0\r\nHost: x\r\n\r\n",
            b"GET / HTTP/1.1\r\n:NoName\r\nHost: x\r\n\r\n",
            b"GET /../../../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n",
            b"GET /%2e%2e/%2e%2e/etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n",
            b"\r\n\r\n",
        ] {
            assert_eq!(status_of(raw), 400, "{}", decode(raw));
        }
    }

    #[test]
    fn method_table() {
        assert_eq!(status_of(b"TRACE / HTTP/1.1\r\nHost: x\r\n\r\n"), 405);
        assert_eq!(status_of(b"OPTIONS * HTTP/1.1\r\nHost: x\r\n\r\n"), 405);
        assert_eq!(status_of(b"INVALID / HTTP/1.1\r\nHost: x\r\n\r\n"), 501);
        assert_eq!(status_of(b"DELETE /test.txt HTTP/1.1\r\nHost: x\r\n\r\n"), 204);
        assert_eq!(status_of(b"POST / HTTP/1.1\r\nHost: x\r\n\r\nabc"), 411);
        assert_eq!(
            status_of(b"POST /uploads HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\n\r\nabc"),
            201
        );
    }

    #[test]
    fn head_keeps_length_but_drops_body() {
        let reply = respond(b"HEAD / HTTP/1.1\r\nHost: x\r\n\r\n");
        let rendered = decode(&reply.render());
        assert!(rendered.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(rendered.contains(&format!("Content-Length: {}\r\n", INDEX_PAGE.len())));
        assert!(rendered.ends_with("\r\n\r\n"));
    }

    #[test]
    fn content_length_rules() {
        assert_eq!(
            status_of(b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length: 10\r\nContent-Length: 5\r\n\r\n"),
            400
        );
        assert_eq!(status_of(b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length: -1\r\n\r\n"), 400);
        assert_eq!(status_of(b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length: 10\r\n\r\nshort"), 400);
        assert_eq!(
            status_of(b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length: 999999999999999999999\r\n\r\n"),
            413
        );
        assert_eq!(status_of(b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length:  5  \r\n\r\nhello"), 200);
    }

    #[test]
    fn progress_waits_for_declared_body() {
        assert_eq!(progress(b"GET / HTTP/1.1\r\nHost"), Progress::NeedHead);
        assert_eq!(progress(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"), Progress::Complete);
        assert_eq!(
            progress(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello"),
            Progress::NeedBody
        );
        assert_eq!(
            progress(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello"),
            Progress::Complete
        );
        assert_eq!(
            progress(b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n"),
            Progress::Complete
        );
    }
}
