//! Core types and events for drive-mirror

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a remote item, as assigned by the document service
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One failed transfer unit: the item's name and why it failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Display name of the item that failed
    pub filename: String,
    /// Error message
    pub message: String,
}

impl FileFailure {
    /// Create a new failure record
    pub fn new(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            message: message.into(),
        }
    }
}

/// Lifecycle state of a single transfer unit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Submitted, waiting for a worker
    #[default]
    Queued,
    /// A worker is exporting/downloading it
    Running,
    /// Output fully written
    Succeeded,
    /// Failed; a [`FileFailure`] was recorded
    Failed,
    /// Stopped by cancellation; no partial output left behind
    Cancelled,
}

impl TransferState {
    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Succeeded | TransferState::Failed | TransferState::Cancelled
        )
    }
}

/// Snapshot of one transfer unit, pushed on every change
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferUpdate {
    /// Item being transferred
    pub item_id: ItemId,
    /// Final local name (file, or directory for composite exports)
    pub name: String,
    /// Bytes written so far for this unit
    pub bytes_done: u64,
    /// Reported size of the item (0 when the service does not know it)
    pub bytes_total: u64,
    /// Fraction complete in [0, 1]
    pub fraction: f64,
    /// Current state
    pub state: TransferState,
    /// Human-readable phase ("preparing", "downloading: 40%", ...)
    pub message: String,
}

/// Summary of a finished (or cancelled) run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Timestamped directory the run wrote into
    pub run_dir: PathBuf,
    /// Units that completed successfully
    pub succeeded: usize,
    /// Units and folders that failed (one per failure record)
    pub failed: usize,
    /// Units stopped by cancellation
    pub cancelled: usize,
    /// Every failure recorded during the run
    pub failures: Vec<FileFailure>,
    /// Total bytes written across all units
    pub bytes_processed: u64,
    /// Total bytes known when the run ended
    pub bytes_known: u64,
}

impl RunReport {
    /// True only if nothing failed and nothing was cancelled
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// Event emitted during a mirror run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The run directory was created and traversal is starting
    RunStarted {
        /// Directory the run writes into
        run_dir: PathBuf,
    },

    /// Human-readable status line
    Status {
        /// Status message
        message: String,
    },

    /// Overall progress changed
    Progress {
        /// bytes_processed / bytes_known, clamped to [0, 1]
        fraction: f64,
        /// Bytes written so far
        bytes_processed: u64,
        /// Bytes known so far (only ever grows)
        bytes_known: u64,
    },

    /// A folder's children were enumerated during the run
    FolderResolved {
        /// Folder identifier
        item_id: ItemId,
        /// Folder name
        name: String,
        /// Number of children found
        children: usize,
        /// Bytes the enumeration added to the known total
        discovered_bytes: u64,
    },

    /// A transfer unit was submitted to the worker pool
    TransferQueued {
        /// Item identifier
        item_id: ItemId,
        /// Final local name
        name: String,
        /// Destination path
        path: PathBuf,
    },

    /// A transfer unit changed (bytes, state or phase)
    Transfer(TransferUpdate),

    /// A transfer unit or folder failed
    FileFailed(FileFailure),

    /// The run reached its end
    RunFinished {
        /// Units that succeeded
        succeeded: usize,
        /// Failures recorded
        failed: usize,
        /// Units cancelled
        cancelled: usize,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!TransferState::Queued.is_terminal());
        assert!(!TransferState::Running.is_terminal());
        assert!(TransferState::Succeeded.is_terminal());
        assert!(TransferState::Failed.is_terminal());
        assert!(TransferState::Cancelled.is_terminal());
    }

    #[test]
    fn report_with_any_failure_is_not_success() {
        let mut report = RunReport {
            succeeded: 10,
            ..Default::default()
        };
        assert!(report.is_success());

        report.failed = 1;
        assert!(!report.is_success(), "a single failure must not read as success");

        report.failed = 0;
        report.cancelled = 1;
        assert!(!report.is_success(), "cancelled units must not read as success");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::FileFailed(FileFailure::new("Budget", "HTTP 500: boom"));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "file_failed");
        assert_eq!(json["filename"], "Budget");
        assert_eq!(json["message"], "HTTP 500: boom");
    }

    #[test]
    fn item_id_is_transparent_in_json() {
        let id = ItemId::new("1AbC");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1AbC\"");
        assert_eq!(id.to_string(), "1AbC");
    }
}
