//! Command-line arguments, settings resolution and exit codes for the binary.
//!
//! Values given on the command line take precedence over the config file.
//! The password and the sender filter are read from the file only.

use crate::config::{FileConfig, ScanConfig, TimeoutConfig};
use crate::error::{Error, ErrorCategory, Result};
use crate::filter::SenderFilter;
use crate::proxy::Socks5Proxy;
use crate::scanner::ScanOutcome;
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;

/// Scan completed.
pub const EXIT_OK: u8 = 0;
/// Fatal scan error or unexpected failure.
pub const EXIT_FAILURE: u8 = 1;
/// Invalid or incomplete configuration.
pub const EXIT_CONFIG: u8 = 2;
/// Interrupted with Ctrl-C.
pub const EXIT_CANCELLED: u8 = 130;

/// Extracts failed recipient addresses from bounce notifications in a mailbox.
///
/// Addresses are written to stdout (or `--out`), one per line. Logs go to
/// stderr and are controlled with `RUST_LOG`.
#[derive(Debug, Default, Parser)]
#[command(name = "fail-email-extractor", version)]
pub struct Args {
    /// IMAP server, `HOST` or `HOST:PORT`.
    #[arg(long, value_name = "HOST[:PORT]")]
    pub server: Option<String>,

    /// Login for the mail account.
    #[arg(long, value_name = "LOGIN")]
    pub login: Option<String>,

    /// TOML config file with `[auth]`, `[filter]`, `[connection]` and `[timeouts]`.
    #[arg(long = "cfg", value_name = "PATH")]
    pub cfg: Option<PathBuf>,

    /// Write addresses to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Mailbox to scan [default: INBOX].
    #[arg(long, value_name = "NAME")]
    pub mailbox: Option<String>,

    /// SOCKS5 proxy, `socks5://[user:pass@]host[:port]`.
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,
}

impl Args {
    /// Loads the config file named by `--cfg`, or an empty one.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn load_file(&self) -> Result<FileConfig> {
        match &self.cfg {
            Some(path) => FileConfig::load(path),
            None => Ok(FileConfig::default()),
        }
    }
}

/// Arguments and file values merged into one set of settings.
pub struct Settings {
    server: String,
    port: Option<u16>,
    login: String,
    password: Option<SecretString>,
    mailbox: Option<String>,
    proxy: Option<Socks5Proxy>,
    timeouts: TimeoutConfig,
    sender: Option<String>,
    /// Output file; stdout when `None`.
    pub out: Option<PathBuf>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("server", &self.server)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("mailbox", &self.mailbox)
            .field("proxy", &self.proxy)
            .field("sender", &self.sender)
            .field("out", &self.out)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Merges command-line arguments over the config file.
    ///
    /// Server and login are checked here so a missing value is reported
    /// before any password prompt or network activity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when server or login is missing, and
    /// [`Error::InvalidProxy`] for a malformed proxy URL.
    pub fn resolve(args: Args, file: FileConfig) -> Result<Self> {
        // `[connection] port` belongs to the file's server; a `--server`
        // replaces both.
        let (server, port) = match non_empty(args.server) {
            Some(server) => (Some(server), None),
            None => (non_empty(file.auth.server), file.connection.port),
        };
        let server = server.ok_or_else(|| Error::InvalidConfig {
            message: "'server' not set".into(),
        })?;
        let login = non_empty(args.login.or(file.auth.login)).ok_or_else(|| {
            Error::InvalidConfig {
                message: "'login' not set".into(),
            }
        })?;

        let proxy = args
            .proxy
            .or(file.connection.proxy)
            .map(|url| url.parse::<Socks5Proxy>())
            .transpose()?;

        Ok(Self {
            server,
            port,
            login,
            password: file.auth.password,
            mailbox: args.mailbox.or(file.connection.mailbox),
            proxy,
            timeouts: file.timeouts.to_timeouts(),
            sender: non_empty(file.filter.from),
            out: args.out,
        })
    }

    /// The resolved login.
    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Returns `true` if the config file supplied a password.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Supplies the password, typically read from the terminal.
    pub fn set_password(&mut self, password: SecretString) {
        self.password = Some(password);
    }

    /// The sender filter from `[filter] from`, if configured.
    #[must_use]
    pub fn sender_filter(&self) -> Option<SenderFilter> {
        self.sender.as_deref().map(SenderFilter::new)
    }

    /// Builds the validated scan configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the password is still missing or a
    /// value is malformed.
    pub fn scan_config(self) -> Result<ScanConfig> {
        let mut builder = ScanConfig::builder()
            .server(self.server)
            .login(self.login)
            .timeouts(self.timeouts);

        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(password) = self.password {
            builder = builder.secret_password(password);
        }
        if let Some(mailbox) = self.mailbox {
            builder = builder.mailbox(mailbox);
        }
        if let Some(proxy) = self.proxy {
            builder = builder.proxy(proxy);
        }

        builder.build()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Exit code for an error raised outside the scan.
#[must_use]
pub fn error_exit_code(error: &Error) -> u8 {
    match error.category() {
        ErrorCategory::Configuration => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

/// Exit code for a finished scan.
#[must_use]
pub fn exit_code(outcome: &ScanOutcome) -> u8 {
    match outcome {
        ScanOutcome::Completed(_) => EXIT_OK,
        ScanOutcome::Cancelled(_) => EXIT_CANCELLED,
        ScanOutcome::Failed { error, .. } => error_exit_code(error),
    }
}
