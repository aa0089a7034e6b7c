//! Transport session abstraction.
//!
//! A [`Connect`] implementation is the session factory used by the scanner;
//! it yields a [`MailTransport`], one authenticated connection with read-only
//! mailbox access. [`crate::imap`] provides the IMAP implementation; tests
//! plug in scripted transports.

use crate::config::Credentials;
use crate::error::Result;
use crate::headers::Headers;
use async_trait::async_trait;

/// Reference to one listed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// 0-based position in mailbox order.
    pub index: usize,
    /// Server-assigned identifier.
    pub uid: u32,
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} (UID {})", self.index, self.uid)
    }
}

/// Builds references from server identifiers, preserving their order.
pub fn index_uids(uids: impl IntoIterator<Item = u32>) -> Vec<MessageRef> {
    uids.into_iter()
        .enumerate()
        .map(|(index, uid)| MessageRef { index, uid })
        .collect()
}

/// Lifecycle of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Connected, not logged in.
    Connected,
    /// Logged in with the mailbox open.
    Authenticated,
    /// Released; further operations fail.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Session factory: opens a network connection without authenticating.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Transport produced by this connector.
    type Transport: MailTransport;

    /// Opens a connection.
    ///
    /// # Errors
    ///
    /// Returns a connect-class error if the server cannot be reached.
    async fn connect(&self) -> Result<Self::Transport>;
}

/// One connection to a mail server.
///
/// Mailbox operations require a prior successful [`authenticate`](Self::authenticate).
#[async_trait]
pub trait MailTransport: Send {
    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Logs in. The password is only read during this call.
    ///
    /// # Errors
    ///
    /// Returns an auth-class error if the login is rejected.
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;

    /// Snapshot of the mailbox in server order.
    ///
    /// # Errors
    ///
    /// Returns a transport-class error if listing fails.
    async fn list_messages(&mut self) -> Result<Vec<MessageRef>>;

    /// Fetches and parses one message's headers.
    ///
    /// # Errors
    ///
    /// Returns a transport-class error for this message.
    async fn fetch_headers(&mut self, message: &MessageRef) -> Result<Headers>;

    /// Fetches one message's raw content.
    ///
    /// # Errors
    ///
    /// Returns a transport-class error for this message.
    async fn fetch_body(&mut self, message: &MessageRef) -> Result<Vec<u8>>;

    /// Releases the connection. Idempotent, never fails.
    async fn close(&mut self);
}
