//! Instrumented output file.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// Receives progress and phase changes from an export in flight
pub trait TransferObserver: Send + Sync {
    /// `bytes` more bytes reached the output
    fn on_bytes(&self, bytes: u64);

    /// Output was truncated before a retry; `discarded` bytes no longer count
    fn on_rewind(&self, discarded: u64);

    /// Human-readable phase ("preparing", "exporting", ...)
    fn on_phase(&self, phase: &str);

    /// Fraction of the unit done, for exports that know it better than bytes do
    fn on_fraction(&self, fraction: f64);

    /// Whether the transfer should stop
    fn is_cancelled(&self) -> bool;
}

/// The error writes fail with once a transfer is cancelled
pub fn cancelled_error() -> io::Error {
    io::Error::other("transfer cancelled")
}

/// An output file that reports every write to a [`TransferObserver`]
///
/// Writes fail once the observer reports cancellation, so an export stops at
/// its next write even if the remote call itself does not notice.
pub struct ObservedFile<'o> {
    file: tokio::fs::File,
    observer: &'o dyn TransferObserver,
    written: u64,
}

impl<'o> ObservedFile<'o> {
    /// Wrap a freshly created file
    pub fn new(file: tokio::fs::File, observer: &'o dyn TransferObserver) -> Self {
        Self {
            file,
            observer,
            written: 0,
        }
    }

    /// Bytes written since creation or the last rewind
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Drop everything written so far and start again from offset 0
    pub async fn rewind(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.set_len(0).await?;
        self.file.seek(io::SeekFrom::Start(0)).await?;

        let discarded = std::mem::take(&mut self.written);
        if discarded > 0 {
            tracing::debug!(discarded, "Output rewound for retry");
        }
        self.observer.on_rewind(discarded);
        Ok(())
    }

    /// The underlying file, for work after the export (timestamps)
    pub fn into_file(self) -> tokio::fs::File {
        self.file
    }

    /// Flush buffered data; returns the final byte count
    pub async fn finish(&mut self) -> io::Result<u64> {
        self.file.flush().await?;
        Ok(self.written)
    }
}

impl AsyncWrite for ObservedFile<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.observer.is_cancelled() {
            return Poll::Ready(Err(cancelled_error()));
        }

        match Pin::new(&mut this.file).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.written += n as u64;
                this.observer.on_bytes(n as u64);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
    }
}
