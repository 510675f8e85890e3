//! Test descriptors: what to send, and what counts as a pass.

use core::fmt;
use core::str::FromStr;

use crate::transaction::TransactionSpec;

mod expectation;

pub use expectation::{Evaluation, Expectation, FailurePolicy, ResponseRule};

/// Reporting group of a descriptor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Method,
    Version,
    Malformed,
    Uri,
    Header,
    Body,
    Connection,
    Timeout,
    Stress,
    Security,
    Compliance,
    Edge,
    Config,
    Cgi,
    Upload,
    Autoindex,
    Response,
}

impl Category {
    /// Every category in report order.
    pub const ALL: [Category; 17] = [
        Self::Method,
        Self::Version,
        Self::Malformed,
        Self::Uri,
        Self::Header,
        Self::Body,
        Self::Connection,
        Self::Timeout,
        Self::Stress,
        Self::Security,
        Self::Compliance,
        Self::Edge,
        Self::Config,
        Self::Cgi,
        Self::Upload,
        Self::Autoindex,
        Self::Response,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Version => "version",
            Self::Malformed => "malformed",
            Self::Uri => "uri",
            Self::Header => "header",
            Self::Body => "body",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Stress => "stress",
            Self::Security => "security",
            Self::Compliance => "compliance",
            Self::Edge => "edge",
            Self::Config => "config",
            Self::Cgi => "cgi",
            Self::Upload => "upload",
            Self::Autoindex => "autoindex",
            Self::Response => "response",
        }
    }

    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Method => "HTTP Methods",
            Self::Version => "HTTP Versions",
            Self::Malformed => "Malformed Requests",
            Self::Uri => "URI Handling",
            Self::Header => "Header Handling",
            Self::Body => "Request Body",
            Self::Connection => "Connection Handling",
            Self::Timeout => "Timeout Handling",
            Self::Stress => "Stress Testing",
            Self::Security => "Security",
            Self::Compliance => "HTTP/1.1 Compliance",
            Self::Edge => "Edge Cases",
            Self::Config => "Configuration",
            Self::Cgi => "CGI",
            Self::Upload => "File Upload",
            Self::Autoindex => "Directory Listing",
            Self::Response => "Response Validation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The name did not match any [`Category`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl std::error::Error for UnknownCategory {}

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category {:?}", self.0)
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(value.to_owned()))
    }
}

/// One immutable test case.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDescriptor {
    name: String,
    category: Category,
    transaction: TransactionSpec,
    expectation: Expectation,
}

impl TestDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: Category,
        transaction: TransactionSpec,
        expectation: Expectation,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            transaction,
            expectation,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub const fn transaction(&self) -> &TransactionSpec {
        &self.transaction
    }

    #[must_use]
    pub const fn expectation(&self) -> &Expectation {
        &self.expectation
    }
}
