//! One transfer unit: a single item exported into its planned output.

use super::RunShared;
use super::progress::{TransferHandle, UnitProgress};
use crate::error::{Error, Result};
use crate::export::{Destination, ExportContext, Exporter, ObservedFile};
use crate::format::ExportFormat;
use crate::naming::{create_dir_exclusive, create_file_exclusive};
use crate::tree::RemoteItem;
use crate::types::TransferState;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// What a unit transfers and where, decided by the coordinator
pub(super) struct UnitPlan {
    pub(super) item: Arc<RemoteItem>,
    pub(super) exporter: Exporter,
    pub(super) format: ExportFormat,
    pub(super) dir: PathBuf,
    /// Claimed name; the unit may move on to the next free one if it was taken
    pub(super) name: String,
    pub(super) base: String,
    pub(super) extension: String,
}

/// Run one unit to a terminal state
///
/// Errors never leave this function: a failure is recorded and reported, a
/// cancellation only marks the handle.
pub(super) async fn run_unit(shared: Arc<RunShared>, handle: Arc<TransferHandle>, plan: UnitPlan) {
    let progress = UnitProgress {
        shared: shared.clone(),
        handle: handle.clone(),
    };

    // Outlives the export future so cleanup can run off the runtime threads
    let mut output = PartialOutput::default();
    let result = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => None,
        result = execute(&shared, &progress, &plan, &mut output) => Some(result),
    };
    output.discard().await;

    match result {
        Some(Ok(bytes)) => {
            tracing::info!(
                item_id = %plan.item.id,
                name = %plan.item.name,
                bytes,
                "Transfer completed"
            );
            handle.set_state(TransferState::Succeeded, "completed");
            shared.status(format!("Completed: {}", plan.item.name));
        }
        Some(Err(error)) if !shared.cancel.is_cancelled() => {
            handle.set_state(TransferState::Failed, error.to_string());
            shared.record_failure(&plan.item.name, &error);
        }
        _ => {
            tracing::debug!(item_id = %plan.item.id, "Transfer cancelled");
            handle.set_state(TransferState::Cancelled, "cancelled");
        }
    }
    progress.emit_update();
}

async fn execute(
    shared: &RunShared,
    progress: &UnitProgress,
    plan: &UnitPlan,
    output: &mut PartialOutput,
) -> Result<u64> {
    let _permit = shared
        .permits
        .acquire()
        .await
        .map_err(|_| Error::Other("worker pool closed".to_string()))?;

    progress.handle.set_state(TransferState::Running, "preparing");
    progress.emit_update();
    shared.status(format!("Downloading: {}", plan.item.name));

    let mut client = shared.clients.checkout()?;

    let as_directory = plan.exporter.produces_directory();
    let (path, mut destination) = if as_directory {
        let path = create_dir_exclusive(&shared.names, &plan.dir, &plan.name, &plan.base).await?;
        (path.clone(), Destination::Directory(path))
    } else {
        let (path, file) = create_file_exclusive(
            &shared.names,
            &plan.dir,
            &plan.name,
            &plan.base,
            &plan.extension,
        )
        .await?;
        (path, Destination::File(ObservedFile::new(file, progress)))
    };
    output.arm(path.clone(), as_directory);

    let mut ctx = ExportContext {
        client: &mut *client,
        fetcher: shared.fetcher.as_ref(),
        limiter: &shared.limiter,
        names: &shared.names,
        observer: progress,
    };
    let written = plan
        .exporter
        .export(&mut ctx, &plan.item, plan.format, &mut destination)
        .await?;

    let stamped = match (destination, plan.item.modified) {
        (Destination::File(sink), Some(modified)) => {
            let file = sink.into_file().into_std().await;
            set_modified(file, modified).await
        }
        (Destination::Directory(_), Some(modified)) => {
            let target = path.clone();
            match tokio::task::spawn_blocking(move || open_for_times(&target)).await {
                Ok(Ok(dir)) => set_modified(dir, modified).await,
                Ok(Err(e)) => Err(e),
                Err(e) => Err(std::io::Error::other(e)),
            }
        }
        (_, None) => Ok(()),
    };
    if let Err(e) = stamped {
        tracing::warn!(path = %path.display(), error = %e, "Failed to set modification time");
    }

    output.disarm();
    Ok(written)
}

/// Apply the remote modification time through an open handle, then close it
async fn set_modified(file: std::fs::File, modified: DateTime<Utc>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || file.set_modified(SystemTime::from(modified)))
        .await
        .map_err(std::io::Error::other)?
}

/// Open a directory with the access needed to change its timestamps
#[cfg(windows)]
fn open_for_times(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_WRITE_ATTRIBUTES: u32 = 0x0100;
    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;
    std::fs::OpenOptions::new()
        .access_mode(FILE_WRITE_ATTRIBUTES)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)
}

/// Open a directory with the access needed to change its timestamps
#[cfg(not(windows))]
fn open_for_times(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::open(path)
}

/// Output of a unit that has not completed
///
/// [`discard`](Self::discard) removes it on a blocking thread once the unit
/// settles. Dropping a still-armed guard (an aborted unit) removes it inline.
#[derive(Default)]
struct PartialOutput {
    target: Option<(PathBuf, bool)>,
}

impl PartialOutput {
    fn arm(&mut self, path: PathBuf, is_dir: bool) {
        self.target = Some((path, is_dir));
    }

    fn disarm(&mut self) {
        self.target = None;
    }

    async fn discard(&mut self) {
        let Some((path, is_dir)) = self.target.take() else {
            return;
        };
        let removed = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        log_removal(&path, removed);
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        let Some((path, is_dir)) = self.target.take() else {
            return;
        };
        let removed = if is_dir {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        log_removal(&path, removed);
    }
}

fn log_removal(path: &Path, removed: std::io::Result<()>) {
    match removed {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output")
        }
    }
}
