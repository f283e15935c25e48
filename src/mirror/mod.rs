//! Mirror orchestrator split into focused submodules.
//!
//! The `Mirror` session and its runs are organized by concern:
//! - [`traversal`] - Depth-first coordinator: directories, lazy resolution,
//!   name planning and unit submission
//! - [`transfer`] - One transfer unit: permit, exclusive output, export,
//!   timestamps, partial-output cleanup
//! - [`progress`] - Run-wide byte counters and per-unit transfer handles
//! - [`lifecycle`] - Joining units, cancellation with a grace period, the
//!   final report

mod lifecycle;
mod progress;
mod transfer;
mod traversal;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use progress::TransferHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::naming::{NameRegistry, sanitize_filename};
use crate::rate_limiter::RateLimiter;
use crate::remote::{ClientPool, HttpLinkFetcher, LinkFetcher, RemoteClient};
use crate::tree::RemoteItem;
use crate::types::{Event, FileFailure, RunReport, TransferUpdate};
use crate::utils::{create_unique_dir, run_dir_name};
use progress::RunProgress;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A configured mirroring session
///
/// One session can start any number of runs. Every run writes into its own
/// timestamped directory under `mirror.destination_dir` and reports through
/// the session's event stream.
pub struct Mirror {
    config: Arc<Config>,
    clients: ClientPool,
    fetcher: Arc<dyn LinkFetcher>,
    limiter: RateLimiter,
    event_tx: broadcast::Sender<Event>,
}

impl Mirror {
    /// Create a session around a remote client
    ///
    /// The client is used as the prototype every worker's client is forked
    /// from. Fails if the configuration does not validate.
    pub fn new(config: Config, client: Box<dyn RemoteClient>) -> Result<Self> {
        config.validate()?;

        let fetcher = HttpLinkFetcher::new(&config.http)?;
        let limiter = RateLimiter::new(config.rate_limit.requests_per_second);
        let (event_tx, _rx) = broadcast::channel(config.mirror.event_buffer);

        Ok(Self {
            config: Arc::new(config),
            clients: ClientPool::new(client),
            fetcher: Arc::new(fetcher),
            limiter,
            event_tx,
        })
    }

    /// Replace the bearer fetcher used for export links and binary URLs
    pub fn with_link_fetcher(mut self, fetcher: Arc<dyn LinkFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Share an existing limiter (for instance with other sessions on the
    /// same account)
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Subscribe to run events
    ///
    /// Slow receivers lag rather than block the run; see
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Session configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The limiter shared by every run of this session
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Start mirroring `root` into a fresh run directory
    ///
    /// Returns once the run directory exists and the coordinator is running.
    /// Fails if `root` is not a folder or the run directory cannot be
    /// created; everything after that is reported per item.
    pub async fn run(&self, root: Arc<RemoteItem>) -> Result<MirrorRun> {
        if !root.is_folder() {
            return Err(Error::NotAFolder(root.name.clone()));
        }

        let name = run_dir_name(&self.config.mirror.run_dir_prefix, chrono::Local::now());
        let run_dir = create_unique_dir(&self.config.mirror.destination_dir, &name).await?;

        // The root folder itself is mirrored, under its own name
        let names = NameRegistry::new();
        let root_dir = run_dir.join(names.claim(&run_dir, &sanitize_filename(&root.name), ""));
        tracing::info!(path = %root_dir.display(), root = %root.name, "Mirror run starting");

        let shared = Arc::new(RunShared {
            config: self.config.clone(),
            clients: self.clients.clone(),
            fetcher: self.fetcher.clone(),
            limiter: self.limiter.clone(),
            names,
            progress: RunProgress::default(),
            failures: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            event_tx: self.event_tx.clone(),
            permits: Arc::new(Semaphore::new(self.config.mirror.worker_count)),
        });

        let coordinator = tokio::spawn(traversal::coordinate(
            shared.clone(),
            root,
            run_dir.clone(),
            root_dir.clone(),
        ));

        Ok(MirrorRun {
            shared,
            run_dir,
            root_dir,
            coordinator,
        })
    }
}

/// Handle to a run in progress
pub struct MirrorRun {
    shared: Arc<RunShared>,
    run_dir: PathBuf,
    root_dir: PathBuf,
    coordinator: JoinHandle<RunReport>,
}

impl MirrorRun {
    /// Directory this run writes into
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory the root folder is mirrored into, inside [`run_dir`](Self::run_dir)
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Request cancellation
    ///
    /// Traversal stops submitting work, in-flight transfers are interrupted
    /// and their partial output removed. Transfers still running after the
    /// configured grace period are aborted.
    pub fn cancel(&self) {
        if !self.shared.cancel.is_cancelled() {
            tracing::info!(path = %self.run_dir.display(), "Cancellation requested");
        }
        self.shared.cancel.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Overall progress in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.shared.progress.fraction()
    }

    /// Bytes written so far
    pub fn bytes_processed(&self) -> u64 {
        self.shared.progress.processed()
    }

    /// Bytes known so far; grows as folders are discovered
    pub fn bytes_known(&self) -> u64 {
        self.shared.progress.known()
    }

    /// Failures recorded so far
    pub fn failures(&self) -> Vec<FileFailure> {
        self.shared.failures_snapshot()
    }

    /// Snapshot of every transfer unit submitted so far
    pub fn transfers(&self) -> Vec<TransferUpdate> {
        self.shared
            .transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|handle| handle.snapshot())
            .collect()
    }

    /// Wait for the run to end
    ///
    /// A cancelled run returns [`Error::Cancelled`] carrying the report of
    /// what completed before the cancellation took effect.
    pub async fn wait(self) -> Result<RunReport> {
        let report = self
            .coordinator
            .await
            .map_err(|e| Error::Other(format!("mirror coordinator failed: {}", e)))?;

        if self.shared.cancel.is_cancelled() {
            return Err(Error::Cancelled(Box::new(report)));
        }
        Ok(report)
    }
}

/// State shared by the coordinator and every transfer unit of one run
pub(crate) struct RunShared {
    pub(crate) config: Arc<Config>,
    pub(crate) clients: ClientPool,
    pub(crate) fetcher: Arc<dyn LinkFetcher>,
    pub(crate) limiter: RateLimiter,
    /// Claimed names per destination directory
    pub(crate) names: NameRegistry,
    pub(crate) progress: RunProgress,
    /// Append-only
    pub(crate) failures: Mutex<Vec<FileFailure>>,
    pub(crate) transfers: Mutex<Vec<Arc<TransferHandle>>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Bounds the number of transfer units running at once
    pub(crate) permits: Arc<Semaphore>,
}

impl RunShared {
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn status(&self, message: impl Into<String>) {
        self.emit(Event::Status {
            message: message.into(),
        });
    }

    pub(crate) fn publish_progress(&self) {
        self.progress.publish(&self.event_tx);
    }

    /// Record a failed unit or folder, unless the run is being cancelled
    pub(crate) fn record_failure(&self, filename: &str, error: &Error) {
        if self.cancel.is_cancelled() {
            tracing::debug!(name = %filename, error = %error, "Suppressing failure during cancellation");
            return;
        }

        tracing::warn!(name = %filename, error = %error, "Mirror item failed");
        let failure = FileFailure::new(filename, error.to_string());
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure.clone());
        self.emit(Event::FileFailed(failure));
    }

    pub(crate) fn failures_snapshot(&self) -> Vec<FileFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
