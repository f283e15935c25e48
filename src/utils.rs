//! Utility functions for run directories and human-readable sizes

use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Maximum number of ` (n)` suffixes tried for a run directory
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Name of the run directory for a start time: `<prefix> - YYYY-MM-DD HH-MM-SS`
pub fn run_dir_name(prefix: &str, started: DateTime<Local>) -> String {
    format!("{} - {}", prefix, started.format("%Y-%m-%d %H-%M-%S"))
}

/// Create a fresh run directory under `parent`
///
/// `parent` is created if missing. If `name` is already taken, ` (1)`,
/// ` (2)`, ... is appended until a directory can be created that did not
/// exist before.
pub async fn create_unique_dir(parent: &Path, name: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::DirectoryCreation {
            path: parent.to_path_buf(),
            source: e,
        })?;

    for attempt in 0..=MAX_RENAME_ATTEMPTS {
        let candidate = match attempt {
            0 => parent.join(name),
            n => parent.join(format!("{} ({})", name, n)),
        };

        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(Error::DirectoryCreation {
                    path: candidate,
                    source: e,
                });
            }
        }
    }

    Err(Error::DirectoryCreation {
        path: parent.join(name),
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("could not find a unique name after {} attempts", MAX_RENAME_ATTEMPTS),
        ),
    })
}

/// Format a byte count for status lines (`B`, `KB`, `MB`, `GB`)
///
/// ```
/// use drive_mirror::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.1} GB", b / GB)
    }
}
