//! Scan configuration.
//!
//! Use [`ScanConfigBuilder`] to assemble a validated [`ScanConfig`]:
//!
//! ```
//! use fail_email_extractor::ScanConfig;
//!
//! let config = ScanConfig::builder()
//!     .server("imap.example.org")
//!     .login("postmaster")
//!     .password("app-password")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.server.to_string(), "imap.example.org:993");
//! ```
//!
//! Settings can also come from a TOML file, see [`FileConfig`].

use crate::error::{Error, Result};
use crate::proxy::Socks5Proxy;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default port for IMAP over implicit TLS.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Mailbox scanned when none is configured.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Host and port of the mail server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl ServerAddress {
    /// Creates a server address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Parses `host`, `host:port`, `[v6addr]` or `[v6addr]:port`; the port
/// defaults to [`DEFAULT_IMAP_PORT`].
impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid_port = || Error::InvalidConfig {
            message: format!("invalid port in server address '{s}'"),
        };
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid_port());

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| Error::InvalidConfig {
                message: format!("unclosed '[' in server address '{s}'"),
            })?;
            let port = match tail {
                "" => DEFAULT_IMAP_PORT,
                tail => parse_port(tail.strip_prefix(':').ok_or_else(invalid_port)?)?,
            };
            (host, port)
        } else if s.matches(':').count() > 1 {
            return Err(Error::InvalidConfig {
                message: format!("IPv6 server address '{s}' must be written as [addr] or [addr]:port"),
            });
        } else {
            match s.split_once(':') {
                Some((host, port)) => (host, parse_port(port)?),
                None => (s, DEFAULT_IMAP_PORT),
            }
        };

        if host.is_empty() {
            return Err(Error::InvalidConfig {
                message: "'server' not set".into(),
            });
        }
        if port == 0 {
            return Err(Error::InvalidConfig {
                message: format!("invalid port in server address '{s}'"),
            });
        }

        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Login and password for the mail server.
///
/// The password is held as a [`SecretString`] and never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    login: String,
    password: SecretString,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(login: impl Into<String>, password: SecretString) -> Self {
        Self {
            login: login.into(),
            password,
        }
    }

    /// Returns the login.
    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Timeouts for each network operation.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for the login exchange.
    pub auth: Duration,
    /// Timeout for opening the mailbox.
    pub select: Duration,
    /// Timeout for listing message UIDs.
    pub list: Duration,
    /// Timeout for fetching one message's header or body.
    pub fetch: Duration,
    /// Timeout for logout.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            list: Duration::from_secs(30),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Validated settings for one scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Mail server to connect to.
    pub server: ServerAddress,
    /// Login and password.
    pub credentials: Credentials,
    /// Mailbox to scan.
    pub mailbox: String,
    /// Optional SOCKS5 proxy.
    pub proxy: Option<Socks5Proxy>,
    /// Per-operation timeouts.
    pub timeouts: TimeoutConfig,
}

impl ScanConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }
}

/// Builder for [`ScanConfig`].
#[derive(Default)]
pub struct ScanConfigBuilder {
    server: Option<String>,
    port: Option<u16>,
    login: Option<String>,
    password: Option<SecretString>,
    mailbox: Option<String>,
    proxy: Option<Socks5Proxy>,
    timeouts: Option<TimeoutConfig>,
}

impl std::fmt::Debug for ScanConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfigBuilder")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("mailbox", &self.mailbox)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl ScanConfigBuilder {
    /// Sets the server as `host` or `host:port` (required).
    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Overrides the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the login (required).
    #[must_use]
    pub fn login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    /// Sets the password (required).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Sets the password from an already-protected secret.
    #[must_use]
    pub fn secret_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// Sets the mailbox to scan (default `INBOX`).
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Routes the connection through a SOCKS5 proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: Socks5Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the per-message fetch timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .fetch = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the server, login or password is missing,
    /// or the server address is malformed.
    pub fn build(self) -> Result<ScanConfig> {
        let server_raw = self
            .server
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig {
                message: "'server' not set".into(),
            })?;
        let mut server: ServerAddress = server_raw.parse()?;
        if let Some(port) = self.port {
            if port == 0 {
                return Err(Error::InvalidConfig {
                    message: "port must be non-zero".into(),
                });
            }
            server.port = port;
        }

        let login = self
            .login
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidConfig {
                message: "'login' not set".into(),
            })?;

        let password = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "'password' not set".into(),
        })?;

        Ok(ScanConfig {
            server,
            credentials: Credentials::new(login, password),
            mailbox: self.mailbox.unwrap_or_else(|| DEFAULT_MAILBOX.to_string()),
            proxy: self.proxy,
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config file
// ─────────────────────────────────────────────────────────────────────────────

/// Contents of a TOML configuration file.
///
/// ```toml
/// [auth]
/// server = "imap.example.org"
/// login = "newsletter@example.org"
/// password = "app-password"
///
/// [filter]
/// from = "MAILER-DAEMON@example.org"
///
/// [connection]
/// mailbox = "INBOX"
/// proxy = "socks5://127.0.0.1:9050"
///
/// [timeouts]
/// fetch_secs = 60
/// ```
///
/// Every field is optional; missing values are reported when the final
/// [`ScanConfig`] is built.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// `[auth]` section.
    #[serde(default)]
    pub auth: AuthSection,
    /// `[filter]` section.
    #[serde(default)]
    pub filter: FilterSection,
    /// `[connection]` section.
    #[serde(default)]
    pub connection: ConnectionSection,
    /// `[timeouts]` section.
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// `[auth]` section of the config file.
#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Server as `host` or `host:port`.
    pub server: Option<String>,
    /// Login.
    pub login: Option<String>,
    /// Password; prompted for interactively when absent.
    pub password: Option<SecretString>,
}

impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("server", &self.server)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// `[filter]` section of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSection {
    /// Only messages whose `From` matches this are inspected.
    pub from: Option<String>,
}

/// `[connection]` section of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSection {
    /// Port for `[auth] server`; ignored when `--server` is given.
    pub port: Option<u16>,
    /// Mailbox to scan.
    pub mailbox: Option<String>,
    /// Proxy URL, `socks5://[user:pass@]host[:port]`.
    pub proxy: Option<String>,
}

/// `[timeouts]` section of the config file, in whole seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSection {
    /// Connect timeout.
    pub connect_secs: Option<u64>,
    /// Login timeout.
    pub auth_secs: Option<u64>,
    /// Listing timeout.
    pub list_secs: Option<u64>,
    /// Per-message fetch timeout.
    pub fetch_secs: Option<u64>,
}

impl TimeoutSection {
    /// Applies the configured values on top of the defaults.
    #[must_use]
    pub fn to_timeouts(&self) -> TimeoutConfig {
        let mut timeouts = TimeoutConfig::default();
        if let Some(secs) = self.connect_secs {
            timeouts.connect = Duration::from_secs(secs);
        }
        if let Some(secs) = self.auth_secs {
            timeouts.auth = Duration::from_secs(secs);
        }
        if let Some(secs) = self.list_secs {
            timeouts.list = Duration::from_secs(secs);
        }
        if let Some(secs) = self.fetch_secs {
            timeouts.fetch = Duration::from_secs(secs);
        }
        timeouts
    }
}

impl FileConfig {
    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadConfigFile`] or [`Error::ParseConfigFile`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| Error::ParseConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }
}
