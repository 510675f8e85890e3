//! Optional server features: configuration, CGI, uploads, directory listing,
//! and the shape of an ordinary response.

use super::{status, status_or_error, text, Http, Rows};
use crate::descriptor::{Category, Expectation, ResponseRule};
use crate::orchestrator::{Batch, Gate};
use crate::transaction::TransactionSpec;

const FORM: &str = "Content-Type: application/x-www-form-urlencoded";
const PLAIN: &str = "Content-Type: text/plain";
const UPLOAD_BOUNDARY: &str = "--WebKitFormBoundary";
const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x02\x00\x00\x00\x90wS\xde";

pub(super) fn batches(http: &Http<'_>) -> Vec<Batch> {
    vec![
        configuration(http),
        alternate_port(),
        cgi(http),
        uploads(http),
        autoindex(http),
        response_shape(http),
    ]
}

fn configuration(http: &Http<'_>) -> Batch {
    let oversized = http.with_body("POST", "/", &[PLAIN], "x".repeat(2_000_000).as_bytes());

    let mut rows = Rows::new(Category::Config);
    rows.send("Config 1: Valid configuration loads", http.get("/"), status(&[200]))
        .send(
            "Config 2: Server name recognition",
            text("GET / HTTP/1.1\r\nHost: test.local\r\n\r\n"),
            status(&[200, 404]),
        )
        .send("Config 4: Error page handling", http.get("/nonexistent"), status(&[404]))
        .spec(
            "Config 5: Client max body size limit",
            TransactionSpec::whole(oversized).timeout_secs(5),
            status_or_error(&[413, 400]),
        )
        .send(
            "Config 6: Method restrictions by location",
            http.request("POST", "/get-only/", &[]),
            status(&[405, 404]),
        )
        .send("Config 7: Autoindex configuration", http.get("/uploads/"), status(&[200, 404]))
        .send("Config 8: Redirect configuration", http.get("/redirect"), status(&[301, 302, 404]))
        .send("Config 9: CGI configuration", http.get("/cgi-bin/test.py"), status(&[200, 404, 500]))
        .send("Config 10: File serving", http.get("/index.html"), status(&[200, 404]))
        .send("Config 11: Directory with index", http.get("/"), status(&[200, 404]))
        .send("Config 12: Custom error page", http.get("/nonexistent123.html"), status(&[404]))
        .send(
            "Config 13: Server name matching",
            text("GET / HTTP/1.1\r\nHost: test.local\r\n\r\n"),
            status(&[200, 404]),
        );
    rows.sequential("Configuration")
}

/// A second virtual server on `port + 1`; skipped when nothing listens there.
fn alternate_port() -> Batch {
    let request = || TransactionSpec::whole(text("GET / HTTP/1.1\r\nHost: alt.local\r\n\r\n")).port_offset(1);

    let mut rows = Rows::new(Category::Config);
    rows.spec(
        "Config 3: Multiple servers different ports",
        request(),
        status(&[200, 404]),
    );
    rows.sequential("Configuration: Alternate port")
        .with_gate(Gate::new(request(), &[], "second server not available"))
}

fn cgi(http: &Http<'_>) -> Batch {
    let cgi_band = || status(&[200, 404, 500]);

    let mut rows = Rows::new(Category::Cgi);
    rows.send("CGI 1: Basic CGI execution", http.get("/cgi-bin/test.py"), status(&[200, 500]))
        .send(
            "CGI 2: CGI with query string",
            http.get("/cgi-bin/test.py?name=value&other=123"),
            cgi_band(),
        )
        .send(
            "CGI 3: CGI POST request",
            http.with_body("POST", "/cgi-bin/test.py", &[FORM], b"name=test&value=123"),
            status(&[200, 404, 405, 500]),
        )
        .send("CGI 4: PHP script", http.get("/cgi-bin/test.php"), cgi_band())
        .send(
            "CGI 5: CGI environment",
            http.request("GET", "/cgi-bin/test.py?test=env", &["User-Agent: TestAgent"]),
            cgi_band(),
        )
        .spec(
            "CGI 6: Slow CGI script",
            TransactionSpec::whole(http.get("/cgi-bin/slow.py")).timeout_secs(3),
            status_or_error(&[200, 404, 500, 504]),
        )
        .send("CGI 7: Binary output", http.get("/cgi-bin/binary.py"), cgi_band())
        .spec(
            "CGI 8: Large output",
            TransactionSpec::whole(http.get("/cgi-bin/large.py")).timeout_secs(10),
            cgi_band(),
        )
        .send("CGI 9: Script error", http.get("/cgi-bin/error.py"), cgi_band())
        .send("CGI 10: Custom headers", http.get("/cgi-bin/headers.py"), cgi_band());

    rows.sequential("CGI").with_gate(Gate::new(
        TransactionSpec::whole(http.get("/cgi-bin/test.py")),
        &[404],
        "CGI not configured",
    ))
}

fn multipart(filename: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = text(&format!(
        "{UPLOAD_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    ));
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n{UPLOAD_BOUNDARY}--\r\n").as_bytes());
    body
}

fn uploads(http: &Http<'_>) -> Batch {
    let form_type = format!("Content-Type: multipart/form-data; boundary={UPLOAD_BOUNDARY}");
    let form_type = form_type.as_str();
    let created = || status(&[200, 201, 405, 501]);

    let mut rows = Rows::new(Category::Upload);
    rows.send(
        "Upload 1: Basic file upload",
        http.with_body(
            "POST",
            "/uploads",
            &[form_type],
            &multipart("test.txt", "text/plain", b"Test file content"),
        ),
        created(),
    )
    .send(
        "Upload 2: Delete uploaded file",
        http.request("DELETE", "/uploads/test.txt", &[]),
        status(&[200, 204, 404, 405, 501]),
    )
    .spec(
        "Upload 3: Large file upload",
        TransactionSpec::whole(http.with_body(
            "POST",
            "/uploads",
            &[form_type],
            &multipart("large.txt", "text/plain", "x".repeat(100_000).as_bytes()),
        ))
        .timeout_secs(10),
        status(&[200, 201, 405, 413, 501]),
    )
    .send(
        "Upload 4: Binary file upload",
        http.with_body(
            "POST",
            "/uploads",
            &[form_type],
            &multipart("test.png", "image/png", PNG_HEADER),
        ),
        created(),
    );
    for i in 5..=10 {
        rows.send(
            format!("Upload {i}: Plain text upload"),
            http.with_body("POST", "/uploads", &[PLAIN], format!("test_upload_{i}").as_bytes()),
            created(),
        );
    }

    rows.sequential("File Upload").with_gate(Gate::new(
        TransactionSpec::whole(http.get("/uploads")),
        &[404],
        "upload location not configured",
    ))
}

fn autoindex(http: &Http<'_>) -> Batch {
    let mut rows = Rows::new(Category::Autoindex);
    rows.send("Dir 1: Directory listing enabled", http.get("/uploads/"), status(&[200, 404, 403]))
        .send("Dir 2: Directory listing disabled", http.get("/"), status(&[200, 403, 404]))
        .send(
            "Dir 3: Directory without trailing slash",
            http.get("/uploads"),
            status(&[200, 301, 302, 404]),
        );
    for i in 4..=10 {
        rows.send(
            format!("Dir {i}: Missing directory"),
            http.get(&format!("/dir{i}/")),
            status(&[200, 404, 403]),
        );
    }
    rows.sequential("Directory Listing")
}

/// The same `GET /` judged five ways.
fn response_shape(http: &Http<'_>) -> Batch {
    let checks = [
        ("Response 1: Status line format", ResponseRule::WellFormedStatusLine),
        ("Response 2: CRLF framing", ResponseRule::WellFormed),
        (
            "Response 3: Content length information",
            ResponseRule::HeaderPresent(vec!["Content-Length".to_owned(), "Transfer-Encoding".to_owned()]),
        ),
        ("Response 4: Valid status code", ResponseRule::StatusCodeInRange(100, 599)),
        ("Response 5: Non-empty response", ResponseRule::StatusLineExists),
    ];

    let mut rows = Rows::new(Category::Response);
    for (name, rule) in checks {
        rows.send(name, http.get("/"), Expectation::response(rule));
    }
    rows.sequential("Response Validation")
}
