//! Depth-first coordinator for one run.

use super::progress::TransferHandle;
use super::transfer::{self, UnitPlan};
use super::{RunShared, lifecycle};
use crate::error::Error;
use crate::export::Exporter;
use crate::format::ExportFormat;
use crate::naming::output_name;
use crate::tree::{RemoteItem, ResolutionState};
use crate::types::{Event, ItemId, RunReport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::task::JoinSet;

/// Drive a whole run: traverse, then join every unit and build the report
pub(super) async fn coordinate(
    shared: Arc<RunShared>,
    root: Arc<RemoteItem>,
    run_dir: PathBuf,
    root_dir: PathBuf,
) -> RunReport {
    shared.emit(Event::RunStarted {
        run_dir: run_dir.clone(),
    });
    shared.progress.add_known(root.known_bytes());
    shared.publish_progress();

    let mut units = JoinSet::new();
    traverse(&shared, root, &root_dir, &mut units).await;
    tracing::debug!(pending = units.len(), "Traversal finished");

    lifecycle::finish(&shared, run_dir, units).await
}

/// A child of a folder with its final local name decided
struct Planned {
    item: Arc<RemoteItem>,
    name: String,
    base: String,
    extension: String,
    exporter: Exporter,
    format: ExportFormat,
}

async fn traverse(
    shared: &Arc<RunShared>,
    root: Arc<RemoteItem>,
    root_dir: &Path,
    units: &mut JoinSet<()>,
) {
    let mut stack = vec![(root, root_dir.to_path_buf())];
    let mut visited: HashSet<ItemId> = HashSet::new();

    while let Some((folder, dir)) = stack.pop() {
        if shared.cancel.is_cancelled() {
            tracing::info!("Traversal stopped by cancellation");
            return;
        }
        if !visited.insert(folder.id.clone()) {
            tracing::warn!(item_id = %folder.id, name = %folder.name, "Folder reached twice, skipping");
            continue;
        }

        let Some(children) = expand(shared, &folder, &dir).await else {
            continue;
        };
        if shared.cancel.is_cancelled() {
            tracing::info!("Traversal stopped by cancellation");
            return;
        }

        // Every name in this folder is settled before anything is submitted
        let plan = plan_names(shared, &children, &dir);

        let mut subfolders = Vec::new();
        for planned in plan {
            if planned.item.is_folder() {
                subfolders.push((planned.item, dir.join(&planned.name)));
            } else {
                submit(shared, units, planned, &dir);
            }
        }
        stack.extend(subfolders.into_iter().rev());

        // Reap finished units as we go
        while let Some(joined) = units.try_join_next() {
            if let Err(e) = joined
                && e.is_panic()
            {
                tracing::error!(error = %e, "Transfer task panicked");
            }
        }
    }
}

/// Create the folder's directory and make sure its children are known
///
/// Returns `None` when the subtree has to be skipped.
async fn expand(
    shared: &RunShared,
    folder: &RemoteItem,
    dir: &Path,
) -> Option<Vec<Arc<RemoteItem>>> {
    if let Err(source) = tokio::fs::create_dir_all(dir).await {
        let error = Error::DirectoryCreation {
            path: dir.to_path_buf(),
            source,
        };
        shared.record_failure(&folder.name, &error);
        return None;
    }

    // Listed and failed before this run reached it
    if let ResolutionState::Error(message) = folder.state() {
        let error = Error::Other(format!("folder listing failed: {}", message));
        shared.record_failure(&folder.name, &error);
        return None;
    }
    if folder.is_resolved() {
        return Some(folder.children());
    }

    shared.status(format!("Fetching contents of folder: {}", folder.name));
    let resolved = tokio::select! {
        biased;
        _ = shared.cancel.cancelled() => {
            tracing::debug!(item_id = %folder.id, "Folder listing interrupted by cancellation");
            return None;
        }
        resolved = folder.resolve(&shared.clients, &shared.config.retry) => resolved,
    };

    match resolved {
        Ok(children) => {
            let discovered = folder.known_bytes();
            shared.progress.add_known(discovered);
            shared.emit(Event::FolderResolved {
                item_id: folder.id.clone(),
                name: folder.name.clone(),
                children: children.len(),
                discovered_bytes: discovered,
            });
            shared.publish_progress();
            Some(children)
        }
        Err(error) => {
            shared.record_failure(&folder.name, &error);
            None
        }
    }
}

fn plan_names(shared: &RunShared, children: &[Arc<RemoteItem>], dir: &Path) -> Vec<Planned> {
    children
        .iter()
        .map(|child| {
            let format = if child.is_folder() {
                ExportFormat::Native
            } else {
                shared.config.export.format_for(&child.content_type)
            };
            let exporter = Exporter::select(&child.content_type, format);
            let as_directory = child.is_folder() || exporter.produces_directory();

            let (base, extension) =
                output_name(&child.name, &child.content_type, format, as_directory);
            let name = shared.names.claim(dir, &base, &extension);

            Planned {
                item: child.clone(),
                name,
                base,
                extension,
                exporter,
                format,
            }
        })
        .collect()
}

fn submit(shared: &Arc<RunShared>, units: &mut JoinSet<()>, planned: Planned, dir: &Path) {
    let path = dir.join(&planned.name);
    let handle = Arc::new(TransferHandle::new(
        planned.item.id.clone(),
        planned.name.clone(),
        planned.item.size,
    ));
    shared
        .transfers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(handle.clone());

    tracing::debug!(item_id = %planned.item.id, path = %path.display(), "Transfer queued");
    shared.emit(Event::TransferQueued {
        item_id: planned.item.id.clone(),
        name: planned.name.clone(),
        path,
    });

    let plan = UnitPlan {
        item: planned.item,
        exporter: planned.exporter,
        format: planned.format,
        dir: dir.to_path_buf(),
        name: planned.name,
        base: planned.base,
        extension: planned.extension,
    };
    units.spawn(transfer::run_unit(shared.clone(), handle, plan));
}
