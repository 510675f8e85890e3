//! Hostile input, RFC compliance checks and rarely used header spellings.

use super::{answers_http11, status, status_or_error, text, Http, Rows};
use crate::descriptor::{Category, Expectation, ResponseRule};
use crate::orchestrator::Batch;

/// Appears in any dump of a unix password file.
const PASSWD_MARKER: &str = "root:x:0:0";

const ATTACKS: [(&str, &str); 20] = [
    ("Directory traversal", "GET /../../../etc/passwd HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    (
        "Windows path traversal",
        "GET /..\\..\\..\\windows\\system32\\config\\sam HTTP/1.1\r\nHost: {host}\r\n\r\n",
    ),
    (
        "Encoded traversal",
        "GET /%2e%2e%2f%2e%2e%2f%2e%2e%2fetc%2fpasswd HTTP/1.1\r\nHost: {host}\r\n\r\n",
    ),
    ("X-Forwarded-For injection", "GET / HTTP/1.1\r\nHost: {host}\r\nX-Forwarded-For: 127.0.0.1\r\n\r\n"),
    ("X-Real-IP injection", "GET / HTTP/1.1\r\nHost: {host}\r\nX-Real-IP: 127.0.0.1\r\n\r\n"),
    ("XSS in Referer", "GET / HTTP/1.1\r\nHost: {host}\r\nReferer: javascript:alert('xss')\r\n\r\n"),
    (
        "XSS in User-Agent",
        "GET / HTTP/1.1\r\nHost: {host}\r\nUser-Agent: <script>alert('xss')</script>\r\n\r\n",
    ),
    (
        "SQL injection in Cookie",
        "GET / HTTP/1.1\r\nHost: {host}\r\nCookie: sessionid='; DROP TABLE users; --\r\n\r\n",
    ),
    ("XSS in URL parameter", "GET /?param=<script>alert('xss')</script> HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("Negative Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: -1\r\n\r\n"),
    (
        "Huge Content-Length",
        "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 999999999999999999999\r\n\r\n",
    ),
    ("Chunked encoding", "GET / HTTP/1.1\r\nHost: {host}\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n"),
    (
        "Conflicting framing headers",
        "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n",
    ),
    ("Expect 100-continue", "GET / HTTP/1.1\r\nHost: {host}\r\nExpect: 100-continue\r\n\r\n"),
    ("Range request", "GET / HTTP/1.1\r\nHost: {host}\r\nRange: bytes=0-1000\r\n\r\n"),
    ("If-None-Match header", "GET / HTTP/1.1\r\nHost: {host}\r\nIf-None-Match: *\r\n\r\n"),
    (
        "If-Modified-Since header",
        "GET / HTTP/1.1\r\nHost: {host}\r\nIf-Modified-Since: Wed, 21 Oct 2015 07:28:00 GMT\r\n\r\n",
    ),
    ("WebSocket upgrade", "GET / HTTP/1.1\r\nHost: {host}\r\nUpgrade: websocket\r\n\r\n"),
    ("Cross-origin request", "GET / HTTP/1.1\r\nHost: {host}\r\nOrigin: http://evil.com\r\n\r\n"),
    (
        "CORS preflight",
        "GET / HTTP/1.1\r\nHost: {host}\r\nAccess-Control-Request-Method: POST\r\n\r\n",
    ),
];

const TRAVERSALS: [&str; 6] = [
    "/../etc/passwd",
    "/../../etc/passwd",
    "/../../../etc/passwd",
    "/..\\..\\..\\etc\\passwd",
    "/%2e%2e/%2e%2e/%2e%2e/etc/passwd",
    "/....//....//....//etc/passwd",
];

const VALID_REQUEST_LINES: [(&str, &str); 8] = [
    ("Simple GET", "GET / HTTP/1.1"),
    ("GET with path", "GET /index.html HTTP/1.1"),
    ("POST request", "POST /submit HTTP/1.1"),
    ("DELETE request", "DELETE /resource HTTP/1.1"),
    ("HEAD request", "HEAD / HTTP/1.1"),
    ("OPTIONS with asterisk", "OPTIONS * HTTP/1.1"),
    ("GET with query", "GET /path?query=value HTTP/1.1"),
    ("GET with encoded spaces", "GET /path%20with%20spaces HTTP/1.1"),
];

const INVALID_REQUEST_LINES: [(&str, &str); 8] = [
    ("Missing URI and version", "GET"),
    ("Missing version", "GET /"),
    ("Missing method", "/ HTTP/1.1"),
    ("Unsupported version", "GET / HTTP/2.0"),
    ("Lowercase method", "get / HTTP/1.1"),
    ("Extra spaces", "GET  /  HTTP/1.1"),
    ("Null byte in URI", "GET /\0 HTTP/1.1"),
    ("Extra data after version", "GET / HTTP/1.1 extra"),
];

/// Header name spellings; the server must treat names case-insensitively.
const HEADER_CASES: [(&str, &str); 6] = [
    ("lowercase host", "host: {host}"),
    ("uppercase host", "HOST: {host}"),
    ("mixed case host", "HoSt: {host}"),
    ("Content-Length", "Host: {host}\r\nContent-Length: 0"),
    ("lowercase content-length", "Host: {host}\r\ncontent-length: 0"),
    ("uppercase content-length", "Host: {host}\r\nCONTENT-LENGTH: 0"),
];

const EDGES: [(&str, &str); 20] = [
    ("Tabs in request line", "GET\t/\tHTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("Zero Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 0\r\n\r\n"),
    ("Leading zeros in Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 000\r\n\r\n"),
    ("Plus sign in Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: +0\r\n\r\n"),
    ("Hex Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 0x0\r\n\r\n"),
    ("Decimal Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 1.0\r\n\r\n"),
    ("Non-numeric Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: abc\r\n\r\n"),
    ("Empty Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: \r\n\r\n"),
    ("Spaces in Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length:  5  \r\n\r\nhello"),
    ("Identity encoding", "GET / HTTP/1.1\r\nHost: {host}\r\nTransfer-Encoding: identity\r\n\r\n"),
    ("Gzip encoding", "GET / HTTP/1.1\r\nHost: {host}\r\nTransfer-Encoding: gzip\r\n\r\n"),
    ("Empty Transfer-Encoding", "GET / HTTP/1.1\r\nHost: {host}\r\nTransfer-Encoding: \r\n\r\n"),
    ("TE header", "GET / HTTP/1.1\r\nHost: {host}\r\nTE: trailers\r\n\r\n"),
    ("Trailer header", "GET / HTTP/1.1\r\nHost: {host}\r\nTrailer: X-Custom\r\n\r\n"),
    ("Via header", "GET / HTTP/1.1\r\nHost: {host}\r\nVia: 1.1 proxy\r\n\r\n"),
    ("Max-Forwards header", "GET / HTTP/1.1\r\nHost: {host}\r\nMax-Forwards: 10\r\n\r\n"),
    ("Pragma header", "GET / HTTP/1.1\r\nHost: {host}\r\nPragma: no-cache\r\n\r\n"),
    ("Cache-Control header", "GET / HTTP/1.1\r\nHost: {host}\r\nCache-Control: no-cache\r\n\r\n"),
    (
        "Warning header",
        "GET / HTTP/1.1\r\nHost: {host}\r\nWarning: 199 - \"Miscellaneous warning\"\r\n\r\n",
    ),
    ("Date header from client", "GET / HTTP/1.1\r\nHost: {host}\r\nDate: Wed, 21 Oct 2015 07:28:00 GMT\r\n\r\n"),
];

pub(super) fn batches(http: &Http<'_>) -> Vec<Batch> {
    vec![security(http), compliance(http), edges(http)]
}

fn security(http: &Http<'_>) -> Batch {
    let no_leak = Expectation::response(ResponseRule::All(vec![
        ResponseRule::ContainsVersion("HTTP/1.1".to_owned()),
        ResponseRule::BodyExcludes(PASSWD_MARKER.to_owned()),
    ]))
    .or_connection_error();

    let mut rows = Rows::new(Category::Security);
    for (description, template) in ATTACKS {
        rows.send(format!("Security: {description}"), http.raw(template), no_leak.clone());
    }
    for (index, path) in TRAVERSALS.iter().enumerate() {
        rows.send(
            format!("Security: Path traversal {}", index + 1),
            http.get(path),
            status_or_error(&[400, 403, 404]),
        );
    }
    rows.send(
        "Security: Header injection",
        http.request("GET", "/", &["X-Test: value", "Injected: header"]),
        answers_http11(),
    );
    rows.sequential("Security")
}

fn compliance(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Compliance);
    rows.send("Compliance: Missing Host header", text("GET / HTTP/1.1\r\n\r\n"), status(&[400]))
        .send("Compliance: TRACE method", http.request("TRACE", "/", &[]), status(&[405]))
        .send(
            "Compliance: Invalid request",
            text("INVALID REQUEST\r\n\r\n"),
            status_or_error(&[400]),
        )
        .send("Compliance: Unknown path", http.get("/nonexistent"), status(&[404]));

    for (description, line) in VALID_REQUEST_LINES {
        rows.send(
            format!("Compliance: Request line {description}"),
            http.raw(&format!("{line}\r\nHost: {{host}}\r\n\r\n")),
            Expectation::response(ResponseRule::ContainsVersion("HTTP/1.1".to_owned())),
        );
    }
    for (description, line) in INVALID_REQUEST_LINES {
        rows.send(
            format!("Compliance: Invalid request line {description}"),
            http.raw(&format!("{line}\r\nHost: {{host}}\r\n\r\n")),
            status_or_error(&[400]),
        );
    }

    rows.send(
        "Compliance: Lowercase header names",
        http.raw("GET / HTTP/1.1\r\nhost: {host}\r\ncontent-type: text/html\r\n\r\n"),
        status(&[200, 404]),
    );
    for (description, header) in HEADER_CASES {
        rows.send(
            format!("Compliance: Case insensitive {description}"),
            http.raw(&format!("GET / HTTP/1.1\r\n{header}\r\n\r\n")),
            status(&[200, 404]),
        );
    }
    rows.send(
        "Compliance: Multiple Accept headers",
        http.request("GET", "/", &["Accept: text/html", "Accept: application/json"]),
        status(&[200, 404]),
    )
    .send(
        "Compliance: Header folding",
        http.request("GET", "/", &["X-Folded: line1", " line2"]),
        status_or_error(&[200, 400]),
    )
    .send(
        "Compliance: POST with Content-Length",
        http.with_body("POST", "/", &[], b"test data"),
        status(&[200, 405, 501]),
    )
    .send(
        "Compliance: Browser request",
        http.request(
            "GET",
            "/",
            &[
                "User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
                "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
                "Accept-Language: en-US,en;q=0.5",
                "Accept-Encoding: gzip, deflate",
                "Connection: keep-alive",
                "Upgrade-Insecure-Requests: 1",
            ],
        ),
        status(&[200, 404]),
    )
    .send(
        "Compliance: Favicon request",
        http.request("GET", "/favicon.ico", &["User-Agent: Mozilla/5.0"]),
        status(&[200, 404]),
    );

    let many_headers: Vec<String> = (0..100).map(|i| format!("X-Header-{i}: value{i}")).collect();
    let many_headers: Vec<&str> = many_headers.iter().map(String::as_str).collect();
    rows.send(
        "Compliance: One hundred headers",
        http.request("GET", "/", &many_headers),
        answers_http11(),
    );

    rows.sequential("HTTP/1.1 Compliance")
}

fn edges(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Edge);
    for (index, (description, template)) in EDGES.iter().enumerate() {
        rows.send(
            format!("Edge {}: {description}", index + 1),
            http.raw(template),
            answers_http11(),
        );
    }
    rows.sequential("Edge Cases")
}
