//! Line-oriented output for extracted addresses.
//!
//! The scan callback runs synchronously, so addresses are handed over an
//! unbounded channel to a writer task that owns the output stream. Each
//! address is written as one line and flushed immediately, which keeps the
//! output readable while the scan is still running.

use crate::error::{Error, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Writes addresses to an async writer, one per line.
///
/// ```
/// use fail_email_extractor::AddressSink;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fail_email_extractor::Result<()> {
/// let sink = AddressSink::spawn(Vec::new());
/// let tx = sink.sender();
/// tx.send("bob@y.com".to_string()).unwrap();
/// drop(tx);
///
/// let (out, written) = sink.finish().await?;
/// assert_eq!(out, b"bob@y.com\n");
/// assert_eq!(written, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AddressSink<W> {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<std::io::Result<(W, usize)>>,
}

impl<W> AddressSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Starts the writer task on the current runtime.
    pub fn spawn(writer: W) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_lines(writer, rx));
        Self { tx, task }
    }

    /// A handle for submitting addresses.
    ///
    /// Sending fails only after the writer task stopped on an I/O error,
    /// which [`AddressSink::finish`] then reports.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }

    /// Closes the channel, waits for pending lines, and returns the writer
    /// with the number of lines written.
    ///
    /// Any senders still alive must be dropped first, or this waits for them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Output`] if a write or flush failed.
    pub async fn finish(self) -> Result<(W, usize)> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| Error::Output {
                source: std::io::Error::other(e),
            })?
            .map_err(|source| Error::Output { source })
    }
}

async fn write_lines<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<(W, usize)>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(address) = rx.recv().await {
        writer.write_all(address.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        written += 1;
    }
    debug!(written, "Address sink closed");
    Ok((writer, written))
}
