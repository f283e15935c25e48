mod failures;
mod naming;
mod progress;

use super::*;
use crate::config::Config;
use crate::format::{ExportFormat, FOLDER_TYPE, NativeKind};
use crate::mirror::test_helpers::{
    FakeContent, FakeFetcher, FakeRemote, file_entry, folder_entry, link_for,
};
use crate::types::TransferState;
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

const TEXT: &str = "text/plain";

/// Config writing under `dest`, with no retry delays and no rate limit
fn test_config(dest: &Path) -> Config {
    let mut config = Config::default();
    config.mirror.destination_dir = dest.to_path_buf();
    config.mirror.shutdown_grace = Duration::from_secs(2);
    config.retry.max_attempts = 0;
    config.rate_limit.requests_per_second = None;
    config
}

fn mirror_with(remote: &FakeRemote, fetcher: &FakeFetcher, config: Config) -> Mirror {
    Mirror::new(config, Box::new(remote.clone()))
        .unwrap()
        .with_link_fetcher(Arc::new(fetcher.clone()))
}

fn mirror(remote: &FakeRemote, temp: &TempDir) -> Mirror {
    mirror_with(remote, &FakeFetcher::new(), test_config(temp.path()))
}

/// A resolved root folder holding `children`
fn root_with(children: Vec<RemoteItem>) -> Arc<RemoteItem> {
    Arc::new(
        RemoteItem::folder("root", "Root")
            .with_children(children.into_iter().map(Arc::new).collect()),
    )
}

/// Paths of all files below `dir`, relative and sorted
fn files_under(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap();
            relative.to_string_lossy().replace('\\', "/")
        })
        .collect();
    out.sort();
    out
}

/// Everything currently buffered on the receiver
fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
