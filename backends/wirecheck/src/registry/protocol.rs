//! Request line and header syntax: methods, versions, malformed requests, URIs, headers.

use super::{answers_http11, http11_status, status, status_or_error, text, Http, Rows};
use crate::descriptor::Category;
use crate::orchestrator::Batch;

const MALFORMED: [(&str, &str); 25] = [
    ("Missing path and version", "GET\r\nHost: {host}\r\n\r\n"),
    ("Missing version", "GET /\r\nHost: {host}\r\n\r\n"),
    ("Missing path", "GET HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("Missing method", "/ HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("Extra spaces", "GET  /  HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("Extra text", "GET / HTTP/1.1 extra\r\nHost: {host}\r\n\r\n"),
    ("Null byte in path", "GET /\0path HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("Tab in path", "GET /\tpath HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("Leading spaces", "   GET / HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    ("LF instead of CRLF", "GET / HTTP/1.1\nHost: {host}\r\n\r\n"),
    ("Empty request", ""),
    ("Only CRLF", "\r\n\r\n"),
    ("Invalid header", "GET / HTTP/1.1\r\nInvalid header\r\n\r\n"),
    ("Header without colon", "GET / HTTP/1.1\r\nHost\r\n\r\n"),
    ("Header without name", "GET / HTTP/1.1\r\n:NoName\r\n\r\n"),
    ("Duplicate Host header", "GET / HTTP/1.1\r\nHost: {host}\r\nHost: duplicate\r\n\r\n"),
    ("Unsupported HTTP version", "GET / HTTP/2.0\r\nHost: {host}\r\n\r\n"),
    ("Old HTTP version", "GET / HTTP/0.9\r\nHost: {host}\r\n\r\n"),
    ("Malformed version", "GET / HTTP\r\nHost: {host}\r\n\r\n"),
    ("Negative Content-Length", "GET / HTTP/1.1\r\nContent-Length: -1\r\n\r\n"),
    ("Invalid Content-Length", "GET / HTTP/1.1\r\nContent-Length: abc\r\n\r\n"),
    ("Wrong Content-Length", "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 10\r\n\r\nshort"),
    ("Path traversal", "GET /../../../etc/passwd HTTP/1.1\r\nHost: {host}\r\n\r\n"),
    (
        "Duplicate Content-Length",
        "GET / HTTP/1.1\r\nHost: {host}\r\nContent-Length: 10\r\nContent-Length: 5\r\n\r\n",
    ),
    ("Missing Host header", "GET / HTTP/1.1\r\n\r\n"),
];

const URIS: [(&str, &str); 14] = [
    ("Root path", "/"),
    ("Simple file", "/index.html"),
    ("Text file", "/test.txt"),
    ("Double slash", "//"),
    ("Current directory", "/./"),
    ("Parent directory", "/../"),
    ("Path with parent", "/path/../"),
    ("Path with current", "/path/./file"),
    ("Path with double slash", "/path//file"),
    ("Query string", "/path?query=value"),
    ("Multiple query params", "/path?query=value&other=data"),
    ("Percent encoded spaces", "/path%20with%20spaces"),
    ("Percent encoded slashes", "/path%2Fwith%2Fslashes"),
    ("Unencoded spaces", "/path with spaces"),
];

/// Each is sent as the only header of `GET /`.
const HEADERS: [(&str, &str); 13] = [
    ("Standard host header", "Host: {host}"),
    ("No space after colon", "Host:{host}"),
    ("Multiple spaces after colon", "Host:  {host}"),
    ("Lowercase header name", "host: {host}"),
    ("Uppercase header name", "HOST: {host}"),
    ("Content-Length header", "Content-Length: 0"),
    ("Content-Type header", "Content-Type: text/html"),
    ("Connection close", "Connection: close"),
    ("Connection keep-alive", "Connection: keep-alive"),
    ("User-Agent header", "User-Agent: TestAgent/1.0"),
    ("Accept header", "Accept: */*"),
    ("Custom header", "X-Custom-Header: custom-value"),
    ("Empty header value", "X-Empty:"),
];

const REJECTED_VERSIONS: [&str; 9] = [
    "HTTP/0.9", "HTTP/2.0", "HTTP/1.2", "http/1.1", "HTTPS/1.1", "HTTP/1", "HTTP/", "HTTP", "",
];

pub(super) fn batches(http: &Http<'_>) -> Vec<Batch> {
    vec![methods(http), versions(http), malformed(http), uris(http), headers(http)]
}

fn methods(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Method);
    rows.send("Method 1: GET", http.get("/"), http11_status(&[200, 404]))
        .send(
            "Method 2: POST",
            http.with_body(
                "POST",
                "/",
                &["Content-Type: application/x-www-form-urlencoded"],
                b"test=data",
            ),
            http11_status(&[200, 405, 501]),
        )
        .send(
            "Method 3: DELETE",
            http.request("DELETE", "/test.txt", &[]),
            http11_status(&[200, 204, 404, 405]),
        )
        .send("Method 4: HEAD", http.request("HEAD", "/", &[]), http11_status(&[200, 404]));

    let mut index = 5;
    for method in ["PUT", "PATCH", "OPTIONS", "TRACE", "CONNECT"] {
        rows.send(
            format!("Method {index}: {method} returns 405"),
            http.request(method, "/", &[]),
            status(&[405]),
        );
        index += 1;
    }
    for method in ["INVALID", "GET123", "POST!", "DEL ETE", "get"] {
        rows.send(
            format!("Method {index}: Invalid method {method}"),
            http.request(method, "/", &[]),
            status(&[400, 501]),
        );
        index += 1;
    }
    rows.send(
        format!("Method {index}: Empty method"),
        http.raw(" / HTTP/1.1\r\nHost: {host}\r\n\r\n"),
        status_or_error(&[400]),
    );

    rows.sequential("HTTP Methods")
}

fn versions(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Version);
    for version in ["HTTP/1.1", "HTTP/1.0"] {
        rows.send(
            format!("Version {version} accepted"),
            http.raw(&format!("GET / {version}\r\nHost: {{host}}\r\n\r\n")),
            status(&[200, 404]),
        );
    }
    for version in REJECTED_VERSIONS {
        let label = if version.is_empty() { "<empty>" } else { version };
        rows.send(
            format!("Version {label} rejected"),
            http.raw(&format!("GET / {version}\r\nHost: {{host}}\r\n\r\n")),
            status_or_error(&[400]),
        );
    }
    rows.sequential("HTTP Versions")
}

fn malformed(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Malformed);
    for (index, (description, template)) in MALFORMED.iter().enumerate() {
        rows.send(
            format!("Malformed {}: {description}", index + 1),
            http.raw(template),
            status_or_error(&[400, 411]),
        );
    }
    rows.sequential("Malformed Requests")
}

fn uris(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Uri);
    let long_path = format!("/{}", "a".repeat(500));
    let paths = URIS
        .iter()
        .map(|(description, path)| (*description, (*path).to_owned()))
        .chain(std::iter::once(("Very long path", long_path)));

    for (index, (description, path)) in paths.enumerate() {
        rows.send(format!("URI {}: {description}", index + 1), http.get(&path), answers_http11());
    }
    rows.sequential("URI Handling")
}

fn headers(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Header);
    let mut index = 1;
    for (description, header) in HEADERS {
        rows.send(
            format!("Header {index}: {description}"),
            http.raw(&format!("GET / HTTP/1.1\r\n{header}\r\n\r\n")),
            answers_http11(),
        );
        index += 1;
    }
    rows.send(
        format!("Header {index}: Long header value"),
        text(&format!("GET / HTTP/1.1\r\nX-Header: {}\r\n\r\n", "a".repeat(500))),
        answers_http11(),
    );
    index += 1;
    rows.send(
        format!("Header {index}: Latin-1 value"),
        text("GET / HTTP/1.1\r\nX-Unicode: café\r\n\r\n"),
        answers_http11(),
    );
    rows.sequential("Header Handling")
}
