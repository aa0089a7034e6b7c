//! Error types for the fail-email-extractor crate.
//!
//! Errors are grouped into the classes a scan cares about (see [`ErrorCategory`]):
//! configuration problems are reported before any network activity, connect and
//! auth failures end a scan, and transport errors on a single message are
//! absorbed by the scan loop.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a scan.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid or incomplete configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config file {}", path.display())]
    ReadConfigFile {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unexpected fields.
    #[error("failed to parse config file {}", path.display())]
    ParseConfigFile {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// Invalid proxy URL.
    #[error("invalid proxy URL '{url}': {reason}")]
    InvalidProxy {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Connect errors (fatal to a scan)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect via SOCKS5 proxy.
    #[error("failed to connect via SOCKS5 proxy {proxy_host} to {target}")]
    Socks5Connect {
        /// The SOCKS5 proxy hostname.
        proxy_host: String,
        /// The target address.
        target: String,
        /// The underlying SOCKS5 error.
        #[source]
        source: tokio_socks::Error,
    },

    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Auth errors (fatal to a scan)
    // ─────────────────────────────────────────────────────────────────────────
    /// The server rejected the login.
    #[error("login failed for {login}")]
    Login {
        /// The login that was rejected.
        login: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {login} after {timeout:?}")]
    AuthTimeout {
        /// The login used for authentication.
        login: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Transport errors (fatal before scanning, per-message while scanning)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to open the mailbox.
    #[error("failed to open mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Mailbox open timeout.
    #[error("timeout opening mailbox '{mailbox}' after {timeout:?}")]
    SelectTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Listing the mailbox failed.
    #[error("failed to list messages")]
    ListMessages {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Listing the mailbox timed out.
    #[error("timeout listing messages after {timeout:?}")]
    ListTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Fetching a message failed.
    #[error("failed to fetch {part} of message UID {uid}")]
    Fetch {
        /// UID of the message.
        uid: u32,
        /// Which part was requested (`header` or `body`).
        part: &'static str,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Fetching a message timed out.
    #[error("timeout fetching {part} of message UID {uid} after {timeout:?}")]
    FetchTimeout {
        /// UID of the message.
        uid: u32,
        /// Which part was requested.
        part: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The server answered a fetch without the requested data.
    #[error("server returned no {part} for message UID {uid}")]
    MissingData {
        /// UID of the message.
        uid: u32,
        /// Which part was requested.
        part: &'static str,
    },

    /// The message header block could not be parsed.
    #[error("failed to parse headers of message UID {uid}")]
    ParseHeaders {
        /// UID of the message.
        uid: u32,
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// An operation was attempted in the wrong session state.
    #[error("cannot {operation}: session is {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the session was in.
        state: crate::transport::SessionState,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Output errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Writing to the address sink failed.
    #[error("failed to write addresses to output")]
    Output {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// The scanner never retries on its own; this is a hint for callers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::Socks5Connect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::ListMessages { .. }
            | Error::ListTimeout { .. }
            | Error::Fetch { .. }
            | Error::FetchTimeout { .. } => true,

            // Bad credentials, bad config and malformed messages won't fix themselves
            Error::InvalidConfig { .. }
            | Error::ReadConfigFile { .. }
            | Error::ParseConfigFile { .. }
            | Error::InvalidProxy { .. }
            | Error::InvalidDnsName { .. }
            | Error::Login { .. }
            | Error::SelectMailbox { .. }
            | Error::MissingData { .. }
            | Error::ParseHeaders { .. }
            | Error::InvalidState { .. }
            | Error::Output { .. } => false,
        }
    }

    /// Returns the error class, used for logging and exit-code mapping.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig { .. }
            | Error::ReadConfigFile { .. }
            | Error::ParseConfigFile { .. }
            | Error::InvalidProxy { .. }
            | Error::InvalidDnsName { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::Socks5Connect { .. }
            | Error::ConnectTimeout { .. } => ErrorCategory::Connect,

            Error::Login { .. } | Error::AuthTimeout { .. } => ErrorCategory::Auth,

            Error::SelectMailbox { .. }
            | Error::SelectTimeout { .. }
            | Error::ListMessages { .. }
            | Error::ListTimeout { .. }
            | Error::Fetch { .. }
            | Error::FetchTimeout { .. }
            | Error::MissingData { .. }
            | Error::ParseHeaders { .. }
            | Error::InvalidState { .. } => ErrorCategory::Transport,

            Error::Output { .. } => ErrorCategory::Output,
        }
    }
}

/// Error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid configuration; detected before any network activity.
    Configuration,
    /// The server could not be reached.
    Connect,
    /// The server rejected the credentials.
    Auth,
    /// A protocol-level failure on an established session.
    Transport,
    /// The output sink failed.
    Output,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Connect => write!(f, "connect"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::Transport => write!(f, "transport"),
            ErrorCategory::Output => write!(f, "output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SessionState;

    #[test]
    fn test_retryable_classification() {
        let err = Error::InvalidConfig {
            message: "'server' not set".into(),
        };
        assert!(!err.is_retryable());

        let err = Error::TcpConnect {
            target: "imap.example.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_retryable());

        let err = Error::MissingData {
            uid: 7,
            part: "body",
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidConfig {
            message: "'login' not set".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::ConnectTimeout {
            target: "imap.example.com:993".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Connect);

        let err = Error::AuthTimeout {
            login: "admin".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Auth);

        let err = Error::FetchTimeout {
            uid: 3,
            part: "header",
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Transport);
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidState {
            operation: "list messages",
            state: SessionState::Closed,
        };
        assert_eq!(err.to_string(), "cannot list messages: session is closed");
    }
}
