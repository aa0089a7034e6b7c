//! IMAP implementation of the transport session.
//!
//! Messages are listed with `UID SEARCH ALL` and read with `BODY.PEEK[...]`,
//! after opening the mailbox with `EXAMINE`, so a scan never changes flags.

use crate::config::{Credentials, ScanConfig, ServerAddress, TimeoutConfig};
use crate::connection::{self, TlsStream};
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::proxy::Socks5Proxy;
use crate::transport::{index_uids, Connect, MailTransport, MessageRef, SessionState};
use async_imap::types::Fetch;
use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{debug, instrument, warn};

type ImapClient = async_imap::Client<TlsStream>;
type ImapSession = async_imap::Session<TlsStream>;

/// Which part of a message to fetch.
#[derive(Debug, Clone, Copy)]
enum Part {
    Header,
    Body,
}

impl Part {
    fn query(self) -> &'static str {
        match self {
            Part::Header => "BODY.PEEK[HEADER]",
            Part::Body => "BODY.PEEK[]",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Part::Header => "header",
            Part::Body => "body",
        }
    }

    fn extract(self, fetch: &Fetch) -> Option<&[u8]> {
        match self {
            Part::Header => fetch.header(),
            Part::Body => fetch.body(),
        }
    }
}

/// Opens TLS connections to an IMAP server.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    server: ServerAddress,
    proxy: Option<Socks5Proxy>,
    mailbox: String,
    timeouts: TimeoutConfig,
}

impl ImapConnector {
    /// Creates a connector from the connection part of a scan configuration.
    #[must_use]
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            server: config.server.clone(),
            proxy: config.proxy.clone(),
            mailbox: config.mailbox.clone(),
            timeouts: config.timeouts.clone(),
        }
    }
}

#[async_trait]
impl Connect for ImapConnector {
    type Transport = ImapTransport;

    #[instrument(
        name = "imap::connect",
        skip_all,
        fields(server = %self.server, proxy_enabled = self.proxy.is_some())
    )]
    async fn connect(&self) -> Result<ImapTransport> {
        let timeout = self.timeouts.connect;
        let tls_stream = tokio::time::timeout(
            timeout,
            connection::open_tls(&self.server, self.proxy.as_ref()),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: self.server.to_string(),
            timeout,
        })??;

        debug!("TLS connection established");

        Ok(ImapTransport {
            state: Inner::Connected(Box::new(async_imap::Client::new(tls_stream))),
            mailbox: self.mailbox.clone(),
            timeouts: self.timeouts.clone(),
        })
    }
}

enum Inner {
    /// The connection was lost before the session was established.
    Disconnected,
    Connected(Box<ImapClient>),
    Authenticated(Box<ImapSession>),
    Closed,
}

impl Inner {
    fn state(&self) -> SessionState {
        match self {
            Inner::Disconnected => SessionState::Disconnected,
            Inner::Connected(_) => SessionState::Connected,
            Inner::Authenticated(_) => SessionState::Authenticated,
            Inner::Closed => SessionState::Closed,
        }
    }
}

/// One IMAP connection, created by [`ImapConnector`].
pub struct ImapTransport {
    state: Inner,
    mailbox: String,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for ImapTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapTransport")
            .field("state", &self.state.state())
            .field("mailbox", &self.mailbox)
            .finish_non_exhaustive()
    }
}

impl ImapTransport {
    fn session(&mut self, operation: &'static str) -> Result<&mut ImapSession> {
        match &mut self.state {
            Inner::Authenticated(session) => Ok(&mut **session),
            other => Err(Error::InvalidState {
                operation,
                state: other.state(),
            }),
        }
    }

    async fn fetch_part(&mut self, message: &MessageRef, part: Part) -> Result<Vec<u8>> {
        let uid = message.uid;
        let timeout = self.timeouts.fetch;
        let session = self.session("fetch message")?;

        let fetches = tokio::time::timeout(timeout, fetch_uid(session, uid, part))
            .await
            .map_err(|_| Error::FetchTimeout {
                uid,
                part: part.name(),
                timeout,
            })??;

        // Servers may interleave unsolicited FETCH responses for other UIDs.
        matching_fetch(&fetches, uid, |fetch| fetch.uid)
            .and_then(|fetch| part.extract(fetch))
            .map(<[u8]>::to_vec)
            .ok_or(Error::MissingData {
                uid,
                part: part.name(),
            })
    }
}

/// The response for `uid`; responses without a matching UID are never used.
fn matching_fetch<T>(fetches: &[T], uid: u32, uid_of: impl Fn(&T) -> Option<u32>) -> Option<&T> {
    fetches.iter().find(|fetch| uid_of(fetch) == Some(uid))
}

async fn fetch_uid(session: &mut ImapSession, uid: u32, part: Part) -> Result<Vec<Fetch>> {
    let map_err = |source| Error::Fetch {
        uid,
        part: part.name(),
        source,
    };

    let stream = session
        .uid_fetch(uid.to_string(), part.query())
        .await
        .map_err(map_err)?;

    stream.try_collect().await.map_err(map_err)
}

#[async_trait]
impl MailTransport for ImapTransport {
    fn state(&self) -> SessionState {
        self.state.state()
    }

    #[instrument(
        name = "imap::authenticate",
        skip_all,
        fields(login = %credentials.login(), mailbox = %self.mailbox)
    )]
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let client = match std::mem::replace(&mut self.state, Inner::Closed) {
            Inner::Connected(client) => *client,
            other => {
                let state = other.state();
                self.state = other;
                return Err(Error::InvalidState {
                    operation: "authenticate",
                    state,
                });
            }
        };

        debug!("Logging in");

        let login = credentials.login();
        let auth_timeout = self.timeouts.auth;
        let session = match tokio::time::timeout(
            auth_timeout,
            client.login(login, credentials.password()),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err((source, client))) => {
                self.state = Inner::Connected(Box::new(client));
                return Err(Error::Login {
                    login: login.to_string(),
                    source,
                });
            }
            // The client was consumed by the abandoned login future.
            Err(_) => {
                self.state = Inner::Disconnected;
                return Err(Error::AuthTimeout {
                    login: login.to_string(),
                    timeout: auth_timeout,
                })
            }
        };

        self.state = Inner::Authenticated(Box::new(session));

        let mailbox = self.mailbox.clone();
        let select_timeout = self.timeouts.select;
        let session = self.session("open mailbox")?;

        let opened = tokio::time::timeout(select_timeout, session.examine(&mailbox))
            .await
            .map_err(|_| Error::SelectTimeout {
                mailbox: mailbox.clone(),
                timeout: select_timeout,
            })?
            .map_err(|source| Error::SelectMailbox {
                mailbox: mailbox.clone(),
                source,
            })?;

        debug!(exists = opened.exists, "Mailbox opened read-only");

        Ok(())
    }

    #[instrument(name = "imap::list_messages", skip(self), fields(mailbox = %self.mailbox))]
    async fn list_messages(&mut self) -> Result<Vec<MessageRef>> {
        let timeout = self.timeouts.list;
        let session = self.session("list messages")?;

        let uids = tokio::time::timeout(timeout, session.uid_search("ALL"))
            .await
            .map_err(|_| Error::ListTimeout { timeout })?
            .map_err(|source| Error::ListMessages { source })?;

        // UIDs are assigned in arrival order.
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();

        debug!(count = uids.len(), "Listed messages");

        Ok(index_uids(uids))
    }

    #[instrument(
        name = "imap::fetch_headers",
        skip_all,
        fields(index = message.index, uid = message.uid)
    )]
    async fn fetch_headers(&mut self, message: &MessageRef) -> Result<Headers> {
        let raw = self.fetch_part(message, Part::Header).await?;
        Headers::parse(&raw).map_err(|source| Error::ParseHeaders {
            uid: message.uid,
            source,
        })
    }

    #[instrument(
        name = "imap::fetch_body",
        skip_all,
        fields(index = message.index, uid = message.uid)
    )]
    async fn fetch_body(&mut self, message: &MessageRef) -> Result<Vec<u8>> {
        self.fetch_part(message, Part::Body).await
    }

    #[instrument(name = "imap::close", skip(self))]
    async fn close(&mut self) {
        match std::mem::replace(&mut self.state, Inner::Closed) {
            Inner::Authenticated(mut session) => {
                let timeout = self.timeouts.logout;
                match tokio::time::timeout(timeout, session.logout()).await {
                    Ok(Ok(())) => debug!("Logged out"),
                    Ok(Err(e)) => warn!(error = %e, "Logout failed, dropping connection"),
                    Err(_) => warn!(
                        timeout_secs = timeout.as_secs(),
                        "Logout timed out, dropping connection"
                    ),
                }
            }
            Inner::Connected(_) => debug!("Dropping unauthenticated connection"),
            Inner::Disconnected | Inner::Closed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_queries_do_not_set_seen() {
        assert!(Part::Header.query().contains("PEEK"));
        assert!(Part::Body.query().contains("PEEK"));
    }

    #[test]
    fn test_fetch_for_other_uid_is_ignored() {
        let fetches = [(Some(7), "seven"), (None, "untagged"), (Some(9), "nine")];
        let uid_of = |fetch: &(Option<u32>, &str)| fetch.0;

        assert_eq!(matching_fetch(&fetches, 9, uid_of).map(|f| f.1), Some("nine"));
        assert!(matching_fetch(&fetches, 8, uid_of).is_none());
        assert!(matching_fetch(&fetches[1..2], 8, uid_of).is_none());
    }

    fn disconnected() -> ImapTransport {
        ImapTransport {
            state: Inner::Disconnected,
            mailbox: "INBOX".into(),
            timeouts: TimeoutConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_disconnected_session_rejects_operations() {
        let mut transport = disconnected();
        assert_eq!(transport.state(), SessionState::Disconnected);

        let err = transport.list_messages().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                state: SessionState::Disconnected,
                ..
            }
        ));

        let credentials = Credentials::new("admin", "secret".to_string().into());
        let err = transport.authenticate(&credentials).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { operation: "authenticate", .. }));
        assert_eq!(transport.state(), SessionState::Disconnected);

        transport.close().await;
        assert_eq!(transport.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ScanConfig::builder()
            .server(format!("localhost:{port}"))
            .login("admin")
            .password("secret")
            .build()
            .unwrap();

        let err = ImapConnector::new(&config).connect().await.unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Connect);
    }
}
