//! The scan pipeline.
//!
//! [`BounceScanner`] drives one scan over a transport session:
//!
//! `Connecting → Authenticating → Listing → Scanning → Finalizing`
//!
//! Any failure before scanning ends the scan with a [`ScanOutcome::Failed`].
//! Failures on a single message are recorded in the [`ScanReport`] and the
//! loop moves on. The session is closed on every path once it was opened.
//!
//! # Example
//!
//! ```no_run
//! use fail_email_extractor::{BounceScanner, ScanConfig, SenderFilter};
//!
//! # async fn example() -> fail_email_extractor::Result<()> {
//! let config = ScanConfig::builder()
//!     .server("imap.example.org")
//!     .login("news@example.org")
//!     .password("app-password")
//!     .build()?;
//!
//! let scanner = BounceScanner::from_config(&config);
//! scanner
//!     .run(
//!         SenderFilter::new("MAILER-DAEMON@example.org"),
//!         |address| println!("{address}"),
//!         |outcome| eprintln!("scan finished: {}", outcome.is_success()),
//!     )
//!     .await;
//! # Ok(())
//! # }
//! ```

use crate::config::{Credentials, ScanConfig};
use crate::error::Error;
use crate::extractor::{BounceExtractor, DsnExtractor};
use crate::filter::{Decision, MessageFilter};
use crate::imap::ImapConnector;
use crate::transport::{Connect, MailTransport, MessageRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Stage at which a scan failed fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStage {
    /// Opening the connection.
    Connecting,
    /// Logging in and opening the mailbox.
    Authenticating,
    /// Listing the mailbox.
    Listing,
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStage::Connecting => write!(f, "connecting"),
            ScanStage::Authenticating => write!(f, "authenticating"),
            ScanStage::Listing => write!(f, "listing"),
        }
    }
}

/// Which fetch failed for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStep {
    /// Fetching or parsing the headers.
    Headers,
    /// Fetching the raw message.
    Body,
}

/// A message the scan had to give up on.
#[derive(Debug)]
pub struct MessageFailure {
    /// The message.
    pub message: MessageRef,
    /// What was being fetched.
    pub step: FetchStep,
    /// Why it failed.
    pub error: Error,
}

/// Counters collected during the scanning stage.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Messages in the mailbox snapshot.
    pub listed: usize,
    /// Messages whose processing was attempted.
    pub visited: usize,
    /// Messages the filter included.
    pub included: usize,
    /// Messages the filter skipped.
    pub skipped: usize,
    /// Addresses delivered to the callback.
    pub addresses: usize,
    /// Per-message failures, in mailbox order.
    pub failures: Vec<MessageFailure>,
}

impl ScanReport {
    fn record_failure(&mut self, message: MessageRef, step: FetchStep, error: Error) {
        warn!(
            index = message.index,
            uid = message.uid,
            step = ?step,
            error = %error,
            "Skipping message"
        );
        self.failures.push(MessageFailure {
            message,
            step,
            error,
        });
    }
}

/// Terminal result of a scan, reported exactly once.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Every listed message was processed.
    Completed(ScanReport),
    /// The cancellation token fired; the report covers the messages visited so far.
    Cancelled(ScanReport),
    /// The scan could not start scanning.
    Failed {
        /// Where it failed.
        stage: ScanStage,
        /// The fatal error.
        error: Error,
    },
}

impl ScanOutcome {
    /// Returns `true` for [`ScanOutcome::Completed`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Completed(_))
    }

    /// The report, unless the scan failed fatally.
    #[must_use]
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            ScanOutcome::Completed(report) | ScanOutcome::Cancelled(report) => Some(report),
            ScanOutcome::Failed { .. } => None,
        }
    }

    /// The fatal error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            ScanOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Scans a mailbox for bounce notifications.
///
/// Generic over the session factory `C` and the extraction heuristic `E`, so
/// the iteration logic stays the same whatever the transport or heuristic.
pub struct BounceScanner<C, E = DsnExtractor> {
    connector: C,
    credentials: Credentials,
    extractor: E,
    cancel: Option<CancellationToken>,
}

impl BounceScanner<ImapConnector> {
    /// Creates an IMAP scanner with the default extractor.
    #[must_use]
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(ImapConnector::new(config), config.credentials.clone())
    }
}

impl<C: Connect> BounceScanner<C> {
    /// Creates a scanner with the default [`DsnExtractor`].
    #[must_use]
    pub fn new(connector: C, credentials: Credentials) -> Self {
        Self {
            connector,
            credentials,
            extractor: DsnExtractor,
            cancel: None,
        }
    }
}

impl<C: Connect, E: BounceExtractor> BounceScanner<C, E> {
    /// Replaces the extraction heuristic.
    #[must_use]
    pub fn with_extractor<E2: BounceExtractor>(self, extractor: E2) -> BounceScanner<C, E2> {
        BounceScanner {
            connector: self.connector,
            credentials: self.credentials,
            extractor,
            cancel: self.cancel,
        }
    }

    /// Stops the scan before the next message once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The extraction heuristic in use.
    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Runs a scan, calling `on_address` for every bounce address in mailbox
    /// order and then `on_final` with the outcome.
    ///
    /// All callbacks run on the caller's task, one at a time.
    pub async fn run<F, A, Fin>(&self, filter: F, on_address: A, on_final: Fin)
    where
        F: MessageFilter,
        A: FnMut(String),
        Fin: FnOnce(ScanOutcome),
    {
        let outcome = self.scan(filter, on_address).await;
        on_final(outcome);
    }

    /// Runs a scan and returns its outcome.
    #[instrument(
        name = "BounceScanner::scan",
        skip_all,
        fields(login = %self.credentials.login(), extractor = %self.extractor.description())
    )]
    pub async fn scan<F, A>(&self, mut filter: F, mut on_address: A) -> ScanOutcome
    where
        F: MessageFilter,
        A: FnMut(String),
    {
        if self.is_cancelled() {
            info!("Cancelled before connecting");
            return ScanOutcome::Cancelled(ScanReport::default());
        }

        debug!(stage = %ScanStage::Connecting, "Scan started");
        let mut transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(error) => return failed(ScanStage::Connecting, error),
        };

        let outcome = self
            .scan_session(&mut transport, &mut filter, &mut on_address)
            .await;

        transport.close().await;

        if let Some(report) = outcome.report() {
            info!(
                listed = report.listed,
                included = report.included,
                addresses = report.addresses,
                failures = report.failures.len(),
                cancelled = !outcome.is_success(),
                "Scan finished"
            );
        }

        outcome
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    async fn scan_session<T, F, A>(
        &self,
        transport: &mut T,
        filter: &mut F,
        on_address: &mut A,
    ) -> ScanOutcome
    where
        T: MailTransport,
        F: MessageFilter,
        A: FnMut(String),
    {
        debug!(stage = %ScanStage::Authenticating, "Authenticating");
        if let Err(error) = transport.authenticate(&self.credentials).await {
            return failed(ScanStage::Authenticating, error);
        }

        debug!(stage = %ScanStage::Listing, "Listing messages");
        let messages = match transport.list_messages().await {
            Ok(messages) => messages,
            Err(error) => return failed(ScanStage::Listing, error),
        };

        let mut report = ScanReport {
            listed: messages.len(),
            ..ScanReport::default()
        };

        for message in &messages {
            if self.is_cancelled() {
                info!(index = message.index, "Scan cancelled");
                return ScanOutcome::Cancelled(report);
            }
            report.visited += 1;

            let headers = match transport.fetch_headers(message).await {
                Ok(headers) => headers,
                Err(error) => {
                    report.record_failure(*message, FetchStep::Headers, error);
                    continue;
                }
            };

            if filter.decide(message, &headers) == Decision::Skip {
                report.skipped += 1;
                continue;
            }
            report.included += 1;

            let body = match transport.fetch_body(message).await {
                Ok(body) => body,
                Err(error) => {
                    report.record_failure(*message, FetchStep::Body, error);
                    continue;
                }
            };

            if let Some(address) = self.extractor.extract(&headers, &body) {
                debug!(index = message.index, uid = message.uid, address = %address, "Found bounce address");
                report.addresses += 1;
                on_address(address);
            }
        }

        ScanOutcome::Completed(report)
    }
}

impl<C, E: BounceExtractor> std::fmt::Debug for BounceScanner<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BounceScanner")
            .field("credentials", &self.credentials)
            .field("extractor", &self.extractor.description())
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

fn failed(stage: ScanStage, error: Error) -> ScanOutcome {
    warn!(stage = %stage, error = %error, category = %error.category(), "Scan failed");
    ScanOutcome::Failed { stage, error }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let done = ScanOutcome::Completed(ScanReport {
            listed: 2,
            ..ScanReport::default()
        });
        assert!(done.is_success());
        assert_eq!(done.report().map(|r| r.listed), Some(2));
        assert!(done.error().is_none());

        let cancelled = ScanOutcome::Cancelled(ScanReport::default());
        assert!(!cancelled.is_success());
        assert!(cancelled.report().is_some());

        let failed = ScanOutcome::Failed {
            stage: ScanStage::Listing,
            error: Error::ListTimeout {
                timeout: std::time::Duration::from_secs(1),
            },
        };
        assert!(failed.report().is_none());
        assert!(failed.error().is_some());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(ScanStage::Authenticating.to_string(), "authenticating");
    }
}
