//! # fail-email-extractor
//!
//! Scans a mailbox over IMAP and extracts the failed recipient address from
//! every bounce notification (delivery status notification) it finds.
//!
//! The crate provides:
//! - A scan pipeline ([`BounceScanner`]) that visits messages in mailbox order,
//!   asks a [`MessageFilter`] whether each one is worth reading, and hands
//!   extracted addresses to a callback
//! - A read-only IMAP transport (optionally through a SOCKS5 proxy)
//! - Pluggable bounce extraction ([`BounceExtractor`]), RFC 3464 aware by default
//!
//! ## Quick Start
//!
//! ```no_run
//! use fail_email_extractor::{BounceScanner, ScanConfig, ScanOutcome, SenderFilter};
//!
//! # async fn example() -> fail_email_extractor::Result<()> {
//! let config = ScanConfig::builder()
//!     .server("imap.example.org")
//!     .login("newsletter@example.org")
//!     .password("app-password")
//!     .build()?;
//!
//! let mut addresses = Vec::new();
//! let outcome = BounceScanner::from_config(&config)
//!     .scan(
//!         SenderFilter::new("MAILER-DAEMON@example.org"),
//!         |address| addresses.push(address),
//!     )
//!     .await;
//!
//! if let ScanOutcome::Failed { stage, error } = outcome {
//!     eprintln!("scan failed while {stage}: {error}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Partial failures
//!
//! Connecting, logging in and listing are fatal: the scan ends with
//! [`ScanOutcome::Failed`]. A message whose headers or body cannot be fetched
//! is recorded in the [`ScanReport`] and the scan continues with the next one.
//!
//! ## Custom extraction
//!
//! ```
//! use fail_email_extractor::extractor::{BounceExtractor, RegexExtractor};
//! use fail_email_extractor::Headers;
//!
//! let extractor = RegexExtractor::new(r"(?m)^Failed:\s*(\S+@\S+)").unwrap();
//! let raw = b"Subject: report\r\n\r\nFailed: bob@y.com\r\n";
//! assert_eq!(
//!     extractor.extract(&Headers::default(), raw).as_deref(),
//!     Some("bob@y.com")
//! );
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing`. Spans:
//!
//! - `BounceScanner::scan` - One scan
//! - `imap::connect` / `imap::authenticate` / `imap::list_messages` - Session setup
//! - `imap::fetch_headers` / `imap::fetch_body` - Per-message fetches
//! - `imap::close` - Logout
//!
//! Fields include `server`, `login`, `mailbox`, `index` and `uid`. Passwords
//! are never recorded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod headers;
pub mod imap;
pub mod proxy;
pub mod scanner;
pub mod sink;
pub mod transport;

// Internal modules
mod connection;
mod parser;

// Re-exports for ergonomic API
pub use config::{
    Credentials, FileConfig, ScanConfig, ScanConfigBuilder, ServerAddress, TimeoutConfig,
};
pub use error::{Error, ErrorCategory, Result};
pub use extractor::{BounceExtractor, ClosureExtractor, DsnExtractor, RegexExtractor};
pub use filter::{AcceptAll, Decision, MessageFilter, SenderFilter};
pub use headers::Headers;
pub use imap::{ImapConnector, ImapTransport};
pub use proxy::{ProxyAuth, Socks5Proxy};
pub use scanner::{BounceScanner, FetchStep, MessageFailure, ScanOutcome, ScanReport, ScanStage};
pub use sink::AddressSink;
pub use transport::{Connect, MailTransport, MessageRef, SessionState};
