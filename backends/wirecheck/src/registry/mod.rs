//! The enumerated conformance corpus.
//!
//! Every case is a table row: a name, the bytes to send and the outcomes that
//! count as a pass. Adding a case means adding a row; nothing here performs IO.

use crate::descriptor::{Category, Expectation, ResponseRule, TestDescriptor};
use crate::latin1;
use crate::orchestrator::Batch;
use crate::transaction::TransactionSpec;

mod features;
mod hardening;
mod payload;
mod protocol;

/// Knobs for building the suite plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    host_header: String,
    concurrency: usize,
    only: Vec<Category>,
}

impl RegistryOptions {
    /// Defaults:
    /// - `host_header`: `localhost`
    /// - `concurrency`: 10 parallel workers for stress batches
    /// - `only`: empty, meaning every category
    #[must_use]
    pub fn new() -> Self {
        Self {
            host_header: "localhost".to_owned(),
            concurrency: 10,
            only: Vec::new(),
        }
    }

    /// Value of the `Host` header on rows that send one.
    #[must_use]
    pub fn host_header(mut self, host: impl Into<String>) -> Self {
        self.host_header = host.into();
        self
    }

    #[must_use]
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Restricts the plan to `categories`; empty keeps everything.
    #[must_use]
    pub fn only(mut self, categories: Vec<Category>) -> Self {
        self.only = categories;
        self
    }

    #[must_use]
    pub fn get_host_header(&self) -> &str {
        &self.host_header
    }

    #[must_use]
    pub const fn get_concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn get_only(&self) -> &[Category] {
        &self.only
    }

    fn includes(&self, category: Category) -> bool {
        self.only.is_empty() || self.only.contains(&category)
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// The full suite plan in execution order.
#[must_use]
pub fn standard_suite(options: &RegistryOptions) -> Vec<Batch> {
    let http = Http::new(&options.host_header);

    let mut plan = Vec::new();
    plan.extend(protocol::batches(&http));
    plan.extend(payload::batches(&http, options.concurrency));
    plan.extend(hardening::batches(&http));
    plan.extend(features::batches(&http));

    plan.retain(|batch| options.includes(batch.category()));
    plan
}

/// Every descriptor of a plan, in plan order.
pub fn descriptors(plan: &[Batch]) -> impl Iterator<Item = &TestDescriptor> {
    plan.iter().flat_map(Batch::descriptors)
}

/// Request text is Latin-1 so control bytes and `é` go out as single bytes.
pub(crate) fn text(raw: &str) -> Vec<u8> {
    latin1::encode_lossy(raw)
}

/// Builds request bytes carrying the configured `Host`.
pub(crate) struct Http<'a> {
    host: &'a str,
}

impl<'a> Http<'a> {
    pub(crate) const fn new(host: &'a str) -> Self {
        Self { host }
    }

    pub(crate) const fn host(&self) -> &str {
        self.host
    }

    pub(crate) fn get(&self, path: &str) -> Vec<u8> {
        self.request("GET", path, &[])
    }

    /// `<method> <path> HTTP/1.1` with `Host` followed by `headers`, no body.
    pub(crate) fn request(&self, method: &str, path: &str, headers: &[&str]) -> Vec<u8> {
        let mut head = format!("{method} {path} HTTP/1.1\r\nHost: {}\r\n", self.host);
        for header in headers {
            head.push_str(header);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        text(&head)
    }

    /// Like [`Self::request`] with `body` appended and a matching `Content-Length`.
    pub(crate) fn with_body(&self, method: &str, path: &str, headers: &[&str], body: &[u8]) -> Vec<u8> {
        let length = format!("Content-Length: {}", body.len());
        let mut all: Vec<&str> = headers.to_vec();
        all.push(&length);
        let mut bytes = self.request(method, path, &all);
        bytes.extend_from_slice(body);
        bytes
    }

    /// A request whose text is given with `{host}` standing for the Host value.
    pub(crate) fn raw(&self, template: &str) -> Vec<u8> {
        text(&template.replace("{host}", self.host))
    }
}

/// Collects the rows of one category.
pub(crate) struct Rows {
    category: Category,
    descriptors: Vec<TestDescriptor>,
}

impl Rows {
    pub(crate) const fn new(category: Category) -> Self {
        Self {
            category,
            descriptors: Vec::new(),
        }
    }

    pub(crate) fn send(&mut self, name: impl Into<String>, bytes: Vec<u8>, expectation: Expectation) -> &mut Self {
        self.spec(name, TransactionSpec::whole(bytes), expectation)
    }

    pub(crate) fn spec(
        &mut self,
        name: impl Into<String>,
        transaction: TransactionSpec,
        expectation: Expectation,
    ) -> &mut Self {
        self.descriptors
            .push(TestDescriptor::new(name, self.category, transaction, expectation));
        self
    }

    pub(crate) fn sequential(self, title: &str) -> Batch {
        Batch::sequential(title, self.category, self.descriptors)
    }

    pub(crate) fn parallel(self, title: &str, workers: usize) -> Batch {
        Batch::parallel(title, self.category, workers, self.descriptors)
    }
}

/// One of `codes`; a dropped connection fails.
pub(crate) fn status(codes: &[u16]) -> Expectation {
    Expectation::status(codes)
}

/// One of `codes`, or any connection error.
pub(crate) fn status_or_error(codes: &[u16]) -> Expectation {
    Expectation::status(codes).or_connection_error()
}

/// Any `HTTP/1.1` answer, or any connection error.
pub(crate) fn answers_http11() -> Expectation {
    Expectation::response(ResponseRule::ContainsVersion("HTTP/1.1".to_owned())).or_connection_error()
}

/// An `HTTP/1.1` status line with one of `codes`; a dropped connection fails.
pub(crate) fn http11_status(codes: &[u16]) -> Expectation {
    Expectation::response(ResponseRule::All(vec![
        ResponseRule::VersionPrefix("HTTP/1.1".to_owned()),
        ResponseRule::StatusIn(codes.to_vec()),
    ]))
}
