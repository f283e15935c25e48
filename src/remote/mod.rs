//! Remote document-service collaborator
//!
//! The engine does not talk to the service itself. It consumes:
//! - [`RemoteClient`] for listing, export, media download, export links and
//!   sub-part enumeration. A client is not safe for concurrent use; every
//!   worker checks one out of a [`ClientPool`].
//! - [`LinkFetcher`] for the authenticated bearer GET of an export link
//!   ([`HttpLinkFetcher`] is the reqwest-based implementation).

mod http;
mod pool;

pub use http::{HttpLinkFetcher, LinkFetcher};
pub use pool::{ClientPool, PooledClient};

use crate::error::RemoteError;
use crate::tree::Query;
use crate::types::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

/// Destination for streamed bytes
pub type ByteSink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// One entry of a listing page
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Item identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Content type
    pub content_type: String,
    /// Parent folder identifiers
    #[serde(default)]
    pub parents: Vec<String>,
    /// Last modification time
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    /// Size in bytes (0 when the service does not report one)
    #[serde(default)]
    pub size: u64,
    /// Whether the item is shared
    #[serde(default)]
    pub shared: bool,
    /// Direct binary URL usable when the media download is refused
    #[serde(default)]
    pub binary_url: Option<String>,
}

/// A page of listing results
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    /// Entries on this page
    pub entries: Vec<RemoteEntry>,
    /// Token for the next page, if any
    pub next_page_token: Option<String>,
}

/// A sub-document of a composite item (a sheet, a slide)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubPart {
    /// Service identifier of the sub-part
    pub id: String,
    /// Title, when the sub-part has one
    pub title: Option<String>,
    /// Zero-based position within the item
    pub index: usize,
}

/// Export of one item (or one sub-part of it) into a mime type
#[derive(Clone, Copy, Debug)]
pub struct ExportRequest<'a> {
    /// Item to export
    pub item_id: &'a ItemId,
    /// Target mime type
    pub mime_type: &'a str,
    /// Sub-part to export instead of the whole item
    pub part: Option<&'a SubPart>,
}

/// Remote document-service client
///
/// Implementations wrap the real service API. Methods take `&mut self`: a
/// client instance is used by one worker at a time, and [`fork`](Self::fork)
/// produces independent instances for other workers.
#[async_trait::async_trait]
pub trait RemoteClient: Send {
    /// Fetch one page of items matching `query`
    async fn list(
        &mut self,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<ListPage, RemoteError>;

    /// Export an item into `request.mime_type`, streaming into `sink`;
    /// returns the number of bytes written
    async fn export(
        &mut self,
        request: &ExportRequest<'_>,
        sink: &mut ByteSink<'_>,
    ) -> Result<u64, RemoteError>;

    /// Download an item's binary content as-is
    async fn download_media(
        &mut self,
        id: &ItemId,
        sink: &mut ByteSink<'_>,
    ) -> Result<u64, RemoteError>;

    /// Time-limited URL serving the same export, if the service offers one
    async fn export_link(
        &mut self,
        request: &ExportRequest<'_>,
    ) -> Result<Option<String>, RemoteError>;

    /// Enumerate the sub-parts of a composite item, in order
    async fn sub_parts(
        &mut self,
        id: &ItemId,
        content_type: &str,
    ) -> Result<Vec<SubPart>, RemoteError>;

    /// Current bearer token for authenticated fetches
    async fn access_token(&mut self) -> Result<String, RemoteError>;

    /// Create an independent client sharing the same credentials
    fn fork(&self) -> Result<Box<dyn RemoteClient>, RemoteError>;
}
