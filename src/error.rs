//! Error types for drive-mirror
//!
//! This module provides the error handling for the library:
//! - [`Error`] is the crate-wide error returned by the public API
//! - [`RemoteError`] is what the remote document-service collaborator reports
//! - [`ExportError`] covers the export fallback protocol and composite exports

use crate::types::RunReport;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for drive-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for drive-mirror
///
/// Per-item failures never escape a run through this type; they are collected
/// as [`FileFailure`](crate::types::FileFailure) records instead. A run only
/// returns an `Error` when continuing is structurally impossible or when it
/// was cancelled.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "mirror.worker_count")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote document-service call failed
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Export strategy failed after exhausting its fallback
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Network error from the bearer export-link fetch
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A local directory could not be created
    #[error("failed to create directory '{}': {source}", path.display())]
    DirectoryCreation {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled; carries whatever had completed by then
    #[error(
        "run cancelled: {} succeeded, {} failed, {} cancelled",
        .0.succeeded,
        .0.failed,
        .0.cancelled
    )]
    Cancelled(Box<RunReport>),

    /// A folder operation was requested on a non-folder item
    #[error("not a folder: {0}")]
    NotAFolder(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a failed primary export/download should be retried once via
    /// the fallback path.
    ///
    /// Failures writing to the local sink are not remote problems, so they
    /// go straight to the caller.
    pub fn warrants_fallback(&self) -> bool {
        match self {
            Error::Remote(RemoteError::Io(_)) => false,
            Error::Remote(_) | Error::Network(_) => true,
            _ => false,
        }
    }
}

/// Errors reported by the remote document-service collaborator
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, timeout or protocol failure talking to the service
    #[error("transport failure: {0}")]
    Transport(String),

    /// The item is listed but direct retrieval was refused
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The item does not exist (or is no longer visible)
    #[error("not found: {0}")]
    NotFound(String),

    /// The service answered with an unexpected HTTP status
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// The requested conversion is not offered for this item
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Writing the received bytes to the local sink failed
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Export strategy errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// The service returned no export link for the (item, format) pair
    #[error("no export link available for item {id} as {mime_type}")]
    NoExportLink {
        /// Item identifier
        id: String,
        /// Requested output mime type
        mime_type: String,
    },

    /// Direct download failed and the item carries no binary fallback URL
    #[error("no binary fallback URL for item {id}")]
    NoBinaryUrl {
        /// Item identifier
        id: String,
    },

    /// Both the primary call and the export-link fallback failed
    #[error("primary export failed ({primary}); fallback failed ({fallback})")]
    FallbackFailed {
        /// Error from the primary export/download call
        primary: String,
        /// Error from the fallback path
        fallback: String,
    },

    /// One sub-part of a composite document could not be exported
    #[error("sub-part {index} failed: {reason}")]
    SubPart {
        /// Zero-based index of the sub-part
        index: usize,
        /// Why it failed
        reason: String,
    },
}
