//! # drive-mirror
//!
//! Library for mirroring a remote document tree onto the local filesystem.
//!
//! ## Design Philosophy
//!
//! drive-mirror is designed to be:
//! - **Lazy** - Folders are listed only when a run reaches them, and at most once
//! - **Format aware** - Native documents are exported into a configurable format per type
//! - **Library-first** - The remote service is a trait; no CLI or UI
//! - **Event-driven** - Consumers subscribe to events, polling is optional
//!
//! ## Quick Start
//!
//! ```no_run
//! use drive_mirror::{Config, Event, Mirror, Query, RemoteClient, RemoteItem};
//! use std::sync::Arc;
//!
//! # fn connect() -> Box<dyn RemoteClient> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.mirror.destination_dir = "./backup".into();
//!
//!     let mirror = Mirror::new(config, connect())?;
//!
//!     // Subscribe to events
//!     let mut events = mirror.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::Progress { fraction, .. } = event {
//!                 println!("{:.0}%", fraction * 100.0);
//!             }
//!         }
//!     });
//!
//!     let root = Arc::new(RemoteItem::query_root("My Files", Query::owned()));
//!     let run = mirror.run(root).await?;
//!     let report = run.wait().await?;
//!     println!("{} files mirrored, {} failed", report.succeeded, report.failed);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-type export strategies (default, composite)
pub mod export;
/// Content types and the export format catalogue
pub mod format;
/// Run engine: traversal, workers, progress and cancellation
pub mod mirror;
/// Output naming and collision-free file creation
pub mod naming;
/// Request rate limiting with token bucket
pub mod rate_limiter;
/// Remote service collaborator traits
pub mod remote;
/// Retry logic with exponential backoff
pub mod retry;
/// Lazily resolved remote item tree
pub mod tree;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, ExportConfig, HttpConfig, MirrorConfig, RateLimitConfig, RetryConfig};
pub use error::{Error, ExportError, RemoteError, Result};
pub use format::{ExportFormat, NativeKind};
pub use mirror::{Mirror, MirrorRun, TransferHandle};
pub use rate_limiter::RateLimiter;
pub use remote::{
    ByteSink, ClientPool, ExportRequest, HttpLinkFetcher, LinkFetcher, ListPage, RemoteClient,
    RemoteEntry, SubPart,
};
pub use tree::{ChildView, Placeholder, Query, RemoteItem, ResolutionState, build_tree};
pub use types::{Event, FileFailure, ItemId, RunReport, TransferState, TransferUpdate};
