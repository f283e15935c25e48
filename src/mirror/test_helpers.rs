//! Scripted remote service and link fetcher for tests.

use crate::error::{Error, RemoteError, Result};
use crate::remote::{
    ByteSink, ExportRequest, LinkFetcher, ListPage, RemoteClient, RemoteEntry, SubPart,
};
use crate::tree::Query;
use crate::types::ItemId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

/// What the fake service serves for an item (or `item#part`)
#[derive(Clone, Debug)]
pub(crate) enum FakeContent {
    /// Serve `data` in writes of `chunk` bytes
    Bytes { data: Vec<u8>, chunk: usize },
    /// The primary export/download call fails with a transport error
    Fail,
    /// Write `partial` bytes, then fail with a transport error
    FailAfter { partial: usize },
    /// Write `partial` bytes, then never finish
    Stall { partial: usize },
}

#[derive(Default)]
struct FakeState {
    listings: Mutex<HashMap<String, Vec<Vec<RemoteEntry>>>>,
    failing_listings: Mutex<HashSet<String>>,
    stalling_listings: Mutex<HashSet<String>>,
    contents: Mutex<HashMap<String, FakeContent>>,
    parts: Mutex<HashMap<String, Vec<SubPart>>>,
    without_link: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    export_calls: AtomicUsize,
    media_calls: AtomicUsize,
    fork_fails: AtomicBool,
}

/// In-memory [`RemoteClient`]; clones and forks share one script
#[derive(Clone, Default)]
pub(crate) struct FakeRemote {
    state: Arc<FakeState>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Children listing of a folder, one page
    pub(crate) fn with_folder(&self, folder: &str, entries: Vec<RemoteEntry>) -> &Self {
        self.with_pages(&Query::children_of(&ItemId::from(folder)), vec![entries])
    }

    /// Paged results for an arbitrary query
    pub(crate) fn with_pages(&self, query: &Query, pages: Vec<Vec<RemoteEntry>>) -> &Self {
        self.state
            .listings
            .lock()
            .unwrap()
            .insert(query.filter.clone(), pages);
        self
    }

    /// Listing a folder fails with a non-retryable error
    pub(crate) fn fail_listing(&self, folder: &str) -> &Self {
        let query = Query::children_of(&ItemId::from(folder));
        self.state
            .failing_listings
            .lock()
            .unwrap()
            .insert(query.filter);
        self
    }

    /// Listing a folder never completes
    pub(crate) fn stall_listing(&self, folder: &str) -> &Self {
        let query = Query::children_of(&ItemId::from(folder));
        self.state
            .stalling_listings
            .lock()
            .unwrap()
            .insert(query.filter);
        self
    }

    pub(crate) fn with_content(&self, key: &str, content: FakeContent) -> &Self {
        self.state
            .contents
            .lock()
            .unwrap()
            .insert(key.to_string(), content);
        self
    }

    pub(crate) fn with_bytes(&self, key: &str, data: Vec<u8>, chunk: usize) -> &Self {
        self.with_content(key, FakeContent::Bytes { data, chunk })
    }

    pub(crate) fn with_parts(&self, id: &str, parts: Vec<SubPart>) -> &Self {
        self.state
            .parts
            .lock()
            .unwrap()
            .insert(id.to_string(), parts);
        self
    }

    /// `export_link` returns no URL for this item
    pub(crate) fn without_link(&self, id: &str) -> &Self {
        self.state
            .without_link
            .lock()
            .unwrap()
            .insert(id.to_string());
        self
    }

    pub(crate) fn fail_fork(&self) -> &Self {
        self.state.fork_fails.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn export_calls(&self) -> usize {
        self.state.export_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn media_calls(&self) -> usize {
        self.state.media_calls.load(Ordering::SeqCst)
    }

    fn content_for(&self, key: &str) -> FakeContent {
        self.state
            .contents
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_else(|| FakeContent::Bytes {
                data: key.as_bytes().to_vec(),
                chunk: 64 * 1024,
            })
    }

    async fn serve(&self, key: &str, sink: &mut ByteSink<'_>) -> std::result::Result<u64, RemoteError> {
        match self.content_for(key) {
            FakeContent::Bytes { data, chunk } => {
                for piece in data.chunks(chunk.max(1)) {
                    sink.write_all(piece).await?;
                    tokio::task::yield_now().await;
                }
                sink.flush().await?;
                Ok(data.len() as u64)
            }
            FakeContent::Fail => Err(RemoteError::Transport(format!("scripted failure for {key}"))),
            FakeContent::FailAfter { partial } => {
                sink.write_all(&vec![0u8; partial]).await?;
                Err(RemoteError::Transport(format!("connection reset during {key}")))
            }
            FakeContent::Stall { partial } => {
                sink.write_all(&vec![0u8; partial]).await?;
                sink.flush().await?;
                std::future::pending::<()>().await;
                Ok(partial as u64)
            }
        }
    }
}

fn content_key(request: &ExportRequest<'_>) -> String {
    match request.part {
        Some(part) => format!("{}#{}", request.item_id, part.id),
        None => request.item_id.to_string(),
    }
}

/// Link URL the fake service hands out for a content key
pub(crate) fn link_for(key: &str) -> String {
    format!("https://links.test/{key}")
}

#[async_trait::async_trait]
impl RemoteClient for FakeRemote {
    async fn list(
        &mut self,
        query: &Query,
        page_token: Option<&str>,
    ) -> std::result::Result<ListPage, RemoteError> {
        self.state.list_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.state.failing_listings.lock().unwrap().contains(&query.filter) {
            return Err(RemoteError::AccessDenied(query.filter.clone()));
        }
        if self.state.stalling_listings.lock().unwrap().contains(&query.filter) {
            std::future::pending::<()>().await;
        }

        let pages = self
            .state
            .listings
            .lock()
            .unwrap()
            .get(&query.filter)
            .cloned()
            .unwrap_or_default();

        let page: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let entries = pages.get(page).cloned().unwrap_or_default();
        let next_page_token = (page + 1 < pages.len()).then(|| (page + 1).to_string());

        Ok(ListPage {
            entries,
            next_page_token,
        })
    }

    async fn export(
        &mut self,
        request: &ExportRequest<'_>,
        sink: &mut ByteSink<'_>,
    ) -> std::result::Result<u64, RemoteError> {
        self.state.export_calls.fetch_add(1, Ordering::SeqCst);
        self.serve(&content_key(request), sink).await
    }

    async fn download_media(
        &mut self,
        id: &ItemId,
        sink: &mut ByteSink<'_>,
    ) -> std::result::Result<u64, RemoteError> {
        self.state.media_calls.fetch_add(1, Ordering::SeqCst);
        self.serve(id.as_str(), sink).await
    }

    async fn export_link(
        &mut self,
        request: &ExportRequest<'_>,
    ) -> std::result::Result<Option<String>, RemoteError> {
        if self
            .state
            .without_link
            .lock()
            .unwrap()
            .contains(request.item_id.as_str())
        {
            return Ok(None);
        }
        Ok(Some(link_for(&content_key(request))))
    }

    async fn sub_parts(
        &mut self,
        id: &ItemId,
        _content_type: &str,
    ) -> std::result::Result<Vec<SubPart>, RemoteError> {
        Ok(self
            .state
            .parts
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn access_token(&mut self) -> std::result::Result<String, RemoteError> {
        Ok("test-token".to_string())
    }

    fn fork(&self) -> std::result::Result<Box<dyn RemoteClient>, RemoteError> {
        if self.state.fork_fails.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("fork refused".to_string()));
        }
        Ok(Box::new(self.clone()))
    }
}

/// [`LinkFetcher`] serving scripted bodies; unknown URLs answer HTTP 500
#[derive(Clone, Default)]
pub(crate) struct FakeFetcher {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(&self, url: &str, body: Vec<u8>) -> &Self {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
        self
    }

    /// `(url, token)` pairs fetched so far
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LinkFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, token: &str, sink: &mut ByteSink<'_>) -> Result<u64> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), token.to_string()));

        let body = self.bodies.lock().unwrap().get(url).cloned();
        match body {
            Some(body) => {
                sink.write_all(&body).await?;
                sink.flush().await?;
                Ok(body.len() as u64)
            }
            None => Err(Error::Remote(RemoteError::Http {
                status: 500,
                body: format!("no scripted body for {url}"),
            })),
        }
    }
}

/// Listing entry for a file
pub(crate) fn file_entry(id: &str, name: &str, content_type: &str, size: u64) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        content_type: content_type.to_string(),
        size,
        ..Default::default()
    }
}

/// Listing entry for a folder
pub(crate) fn folder_entry(id: &str, name: &str) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        content_type: crate::format::FOLDER_TYPE.to_string(),
        ..Default::default()
    }
}

/// Entry with parent links, for flat listings
pub(crate) fn child_entry(mut entry: RemoteEntry, parents: &[&str]) -> RemoteEntry {
    entry.parents = parents.iter().map(|p| p.to_string()).collect();
    entry
}
