//! Test servers for exercising the wirecheck harness end to end.
//!
//! This crate provides:
//! - **Reference responder**: a strict, deterministic answer for any raw request
//! - **Stub server**: an in-process listener that buffers partial requests
//! - **`stub_webserv`**: a standalone binary for lifecycle tests, configured
//!   with an nginx-like file
//!
//! # Examples
//!
//! ```rust
//! use wirecheck_testing::reference;
//!
//! let reply = reference::respond(b"GET / HTTP/1.1\r\n\r\n");
//! assert_eq!(reply.status(), 400);
//!
//! let reply = reference::respond(b"TRACE / HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! assert_eq!(reply.status(), 405);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Common for testing crates

pub mod config;
pub mod reference;
pub mod server;

// Re-export commonly used items
pub use config::{StubConfig, StubConfigError};
pub use reference::{respond, StubReply};
pub use server::StubServer;
