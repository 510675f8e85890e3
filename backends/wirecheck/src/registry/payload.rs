//! Bodies, connection handling, slow clients and load.

use std::time::Duration;

use super::{answers_http11, status, status_or_error, Http, Rows};
use crate::descriptor::{Category, Expectation, ResponseRule};
use crate::errors::ConnectionErrorKind;
use crate::orchestrator::Batch;
use crate::transaction::TransactionSpec;

const FORM: &str = "Content-Type: application/x-www-form-urlencoded";
const PLAIN: &str = "Content-Type: text/plain";
const MULTIPART_BOUNDARY: &str = "----WebKitFormBoundary7MA4YWxkTrZu0gW";

pub(super) fn batches(http: &Http<'_>, workers: usize) -> Vec<Batch> {
    let mut plan = vec![bodies(http), connections(http), timeouts(http)];
    plan.extend(stress(http, workers));
    plan
}

fn bodies(http: &Http<'_>) -> Batch {
    let form_body = b"name=test&value=123";
    let mut without_length = http.request("POST", "/", &[FORM]);
    without_length.extend_from_slice(form_body);

    let upload = format!(
        "{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"test.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nTest file content\r\n{MULTIPART_BOUNDARY}--\r\n"
    );
    let multipart = format!("Content-Type: multipart/form-data; boundary={MULTIPART_BOUNDARY}");
    let binary: Vec<u8> = (0u8..16).collect();

    let mut declared_larger = http.request("POST", "/", &[PLAIN, "Content-Length: 100"]);
    declared_larger.extend_from_slice(b"short");
    let mut declared_smaller = http.request("POST", "/", &[PLAIN, "Content-Length: 5"]);
    declared_smaller.extend_from_slice(b"this is a longer body than specified");

    let mut rows = Rows::new(Category::Body);
    rows.send(
        "Body 1: POST with Content-Length",
        http.with_body("POST", "/", &[FORM], form_body),
        status(&[200, 405, 501]),
    )
    .send("Body 2: POST without Content-Length", without_length, status(&[400, 411]))
    .send(
        "Body 3: Empty body with Content-Length 0",
        http.with_body("POST", "/", &[FORM], b""),
        status(&[200, 405, 501]),
    )
    .spec(
        "Body 4: Large body within limits",
        TransactionSpec::whole(http.with_body("POST", "/", &[PLAIN], "x".repeat(50_000).as_bytes()))
            .timeout_secs(15),
        status(&[200, 405, 413, 501]),
    )
    .send(
        "Body 5: Multipart upload",
        http.with_body("POST", "/uploads", &[multipart.as_str()], upload.as_bytes()),
        status(&[200, 201, 405, 501]),
    )
    .send(
        "Body 6: JSON body",
        http.with_body(
            "POST",
            "/",
            &["Content-Type: application/json"],
            br#"{"key": "value", "number": 123}"#,
        ),
        status(&[200, 405, 501]),
    )
    .send(
        "Body 7: Binary body",
        http.with_body("POST", "/", &["Content-Type: application/octet-stream"], &binary),
        status(&[200, 400, 405, 501]),
    )
    .spec(
        "Body 8: Content-Length larger than body",
        TransactionSpec::whole(declared_larger).timeout_secs(3),
        status_or_error(&[400, 408]),
    )
    .send(
        "Body 9: Content-Length smaller than body",
        declared_smaller,
        status(&[200, 400, 405, 501]),
    )
    .send(
        "Body 10: UTF-8 body",
        http.with_body(
            "POST",
            "/",
            &["Content-Type: text/plain; charset=utf-8"],
            "Héllo Wörld 🌍".as_bytes(),
        ),
        status(&[200, 405, 501]),
    );
    rows.sequential("Request Body")
}

fn connections(http: &Http<'_>) -> Batch {
    let valid = || Expectation::response(ResponseRule::ContainsVersion("HTTP/1.1".to_owned()));

    let mut rows = Rows::new(Category::Connection);
    rows.send(
        "Connection 1: Keep-alive",
        http.request("GET", "/", &["Connection: keep-alive"]),
        valid(),
    )
    .send(
        "Connection 2: Connection close",
        http.request("GET", "/", &["Connection: close"]),
        valid(),
    );
    for id in 3..=10 {
        rows.send(
            format!("Connection {id}: Sequential request"),
            http.request("GET", "/", &[format!("X-Request-ID: {id}").as_str()]),
            status(&[200, 404]),
        );
    }
    rows.sequential("Connection Handling")
}

fn timeouts(http: &Http<'_>) -> Batch {
    let host = format!("Host: {}\r\n", http.host());
    let half_second = Duration::from_millis(500);

    let slow = TransactionSpec::fragmented(
        fragments(&["GET", " /", " HTTP/1.1\r\n", host.as_str(), "\r\n"]),
        vec![half_second; 4],
    )
    .timeout_secs(10);

    let incomplete = TransactionSpec::fragmented(
        fragments(&["GET / HTTP/1.1\r\n", host.as_str(), "Content-Length: 10\r\n\r\n"]),
        vec![half_second, half_second, Duration::from_secs(3)],
    )
    .timeout_secs(15);

    let mut never_completes = http.request("POST", "/", &[PLAIN, "Content-Length: 100"]);
    never_completes.extend_from_slice(b"hello");

    let mut rows = Rows::new(Category::Timeout);
    rows.spec("Timeout: Slow request", slow, answers_http11())
        .spec(
            "Timeout: Incomplete request",
            incomplete,
            Expectation::status(&[400, 408]).or_connection_error_of(&[
                ConnectionErrorKind::Timeout,
                ConnectionErrorKind::Reset,
                ConnectionErrorKind::Empty,
            ]),
        )
        .spec(
            "Timeout: Declared body never completes",
            TransactionSpec::whole(never_completes).timeout_secs(5),
            Expectation::status(&[400, 408]).or_connection_error_of(&[ConnectionErrorKind::Timeout]),
        );
    rows.sequential("Timeout Handling")
}

fn stress(http: &Http<'_>, workers: usize) -> Vec<Batch> {
    let http11 = || Expectation::response(ResponseRule::ContainsVersion("HTTP/1.1".to_owned()));

    let mut rapid = Rows::new(Category::Stress);
    for i in 0..20 {
        rapid.spec(
            format!("Rapid connection {i}"),
            TransactionSpec::whole(http.request("GET", "/", &[format!("X-Rapid: {i}").as_str()])).timeout_secs(5),
            http11(),
        );
    }

    let mut concurrent = Rows::new(Category::Stress);
    for i in 0..10 {
        concurrent.spec(
            format!("Concurrent connection {i}"),
            TransactionSpec::whole(http.request("GET", "/", &[format!("X-Concurrent: {i}").as_str()])).timeout_secs(10),
            http11(),
        );
    }

    let mut small = Rows::new(Category::Stress);
    for i in 0..50 {
        small.spec(
            format!("Small request {i}"),
            TransactionSpec::whole(http.request("GET", "/test.txt", &[format!("X-Small-Request: {i}").as_str()]))
                .timeout_secs(3),
            http11(),
        );
    }

    let mut persistent = Rows::new(Category::Stress);
    for i in 0..5 {
        persistent.spec(
            format!("Persistent connection {i}"),
            TransactionSpec::whole(http.request(
                "GET",
                "/",
                &["Connection: keep-alive", format!("X-Persistent: {i}").as_str()],
            ))
            .timeout_secs(5),
            status(&[200, 404]),
        );
    }

    let mut mixed = Rows::new(Category::Stress);
    for i in 0..15 {
        let bytes = match i % 3 {
            0 => http.get("/"),
            1 => http.with_body("POST", "/", &[PLAIN], format!("data_{i}").as_bytes()),
            _ => http.request("DELETE", "/", &[]),
        };
        mixed.spec(
            format!("Mixed method {i}"),
            TransactionSpec::whole(bytes).timeout_secs(3),
            status(&[200, 404, 405, 501]),
        );
    }

    let host = format!("Host: {}\r\n", http.host());
    let mut slow = Rows::new(Category::Stress);
    for i in 0..3 {
        slow.spec(
            format!("Slow client {i}"),
            TransactionSpec::fragmented(
                fragments(&["GET", " /", " HTTP/1.1\r\n", host.as_str(), "\r\n"]),
                vec![Duration::from_millis(100); 4],
            )
            .timeout_secs(5),
            status(&[200, 404]),
        );
    }

    vec![
        rapid.sequential("Stress: Rapid connections").with_quorum(0.7),
        concurrent
            .parallel("Stress: Concurrent connections", workers)
            .with_quorum(0.7),
        small.sequential("Stress: Many small requests").with_quorum(0.9),
        persistent
            .sequential("Stress: Persistent connections")
            .with_quorum(0.4),
        mixed.sequential("Stress: Mixed methods").with_quorum(0.6),
        slow.parallel("Stress: Slow clients", workers).with_quorum(0.3),
    ]
}

fn fragments(parts: &[&str]) -> Vec<Vec<u8>> {
    parts.iter().map(|part| part.as_bytes().to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_lengths_match_bodies() {
        let http = Http::new("localhost");
        let batch = bodies(&http);
        let json = batch
            .descriptors()
            .iter()
            .find(|descriptor| descriptor.name() == "Body 6: JSON body")
            .unwrap();
        let bytes = json.transaction().delivery().payload();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 31\r\n"));
    }

    #[test]
    fn stress_batches_fold_to_one_result_each() {
        let http = Http::new("localhost");
        let plan = stress(&http, 10);
        assert_eq!(plan.len(), 6);
        assert!(plan.iter().all(|batch| batch.result_count() == 1));
        assert_eq!(plan[2].descriptors().len(), 50);
    }
}
