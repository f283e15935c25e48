//! Remote tree model with lazy child resolution
//!
//! A [`RemoteItem`] is a node of the remote namespace. Folders start out
//! [`ResolutionState::Unresolved`], holding the [`Query`] that lists their
//! children, and move exactly once to `Resolved` or `Error`. Concurrent
//! callers of [`RemoteItem::resolve`] are serialized, so a node is listed at
//! most once.
//!
//! Resolved children are always ordered folders first, then by
//! case-insensitive name.

mod builder;

pub use builder::build_tree;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::format::{FOLDER_TYPE, FORM_TYPE, ROOT_TYPE, SHORTCUT_TYPE, is_folder_type};
use crate::remote::{ClientPool, RemoteEntry};
use crate::retry::with_retry;
use crate::types::ItemId;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Page size requested from listing calls
pub const PAGE_SIZE: u32 = 1000;

/// Identifier given to synthetic roots
pub const ROOT_ID: &str = "virtual-root";

/// How the entries returned by a [`Query`] become children
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryShape {
    /// Each entry is a direct child; sub-folders stay lazy
    Children,
    /// Entries are a flat dump of a whole subtree, rebuilt from parent links
    Flattened,
}

/// Resolver handle: the listing query that enumerates a folder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// Service query expression
    pub filter: String,
    /// Requested page size
    pub page_size: u32,
    /// How results attach to the node
    pub shape: QueryShape,
}

impl Query {
    fn new(filter: String, shape: QueryShape) -> Self {
        Self {
            filter: format!(
                "{} and mimeType != '{}' and mimeType != '{}'",
                filter, FORM_TYPE, SHORTCUT_TYPE
            ),
            page_size: PAGE_SIZE,
            shape,
        }
    }

    /// Direct children of a folder
    pub fn children_of(id: &ItemId) -> Self {
        Self::new(
            format!(
                "'{}' in parents and trashed = false",
                id.as_str().replace('\'', "\\'")
            ),
            QueryShape::Children,
        )
    }

    /// Everything the account owns, as one tree
    pub fn owned() -> Self {
        Self::new(
            "'me' in owners and trashed = false".to_string(),
            QueryShape::Flattened,
        )
    }

    /// Everything shared with the account, as one tree
    pub fn shared_with_me() -> Self {
        Self::new(
            "(not 'me' in owners or sharedWithMe = true) and trashed = false".to_string(),
            QueryShape::Flattened,
        )
    }

    /// The trash, as one tree
    pub fn trashed() -> Self {
        Self::new("trashed = true".to_string(), QueryShape::Flattened)
    }
}

/// Children resolution state of a node
#[derive(Clone, Debug)]
pub enum ResolutionState {
    /// Not yet listed; holds the query that will list it
    Unresolved(Query),
    /// Listed; children kept in folder-first, name order
    Resolved(Vec<Arc<RemoteItem>>),
    /// Listing failed; the node reports no children and is not retried
    Error(String),
}

impl ResolutionState {
    /// Apply the outcome of a listing
    ///
    /// Only `Unresolved` moves; `Resolved` and `Error` are final and returned
    /// unchanged.
    pub fn complete(
        self,
        outcome: std::result::Result<Vec<Arc<RemoteItem>>, String>,
    ) -> ResolutionState {
        match self {
            ResolutionState::Unresolved(_) => match outcome {
                Ok(mut children) => {
                    sort_children(&mut children);
                    ResolutionState::Resolved(children)
                }
                Err(message) => ResolutionState::Error(message),
            },
            settled => settled,
        }
    }
}

/// UI placeholder shown in place of real children
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// Children not listed yet
    Loading,
    /// Folder listed and empty
    Empty,
    /// Listing failed
    Error,
}

impl Placeholder {
    /// Marker label
    pub fn label(&self) -> &'static str {
        match self {
            Placeholder::Loading => "loading",
            Placeholder::Empty => "empty",
            Placeholder::Error => "error",
        }
    }
}

/// What a presentation layer shows under a node
#[derive(Clone, Debug)]
pub enum ChildView {
    /// A real child
    Item(Arc<RemoteItem>),
    /// A placeholder; never a transfer target
    Placeholder(Placeholder),
}

/// A node of the remote namespace
#[derive(Debug)]
pub struct RemoteItem {
    /// Item identifier
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Content type
    pub content_type: String,
    /// Size in bytes (0 for folders until computed)
    pub size: u64,
    /// Last modification time reported by the service
    pub modified: Option<DateTime<Utc>>,
    /// Whether the item is shared
    pub shared: bool,
    /// Direct binary URL used when the media download is refused
    pub binary_url: Option<String>,
    state: Mutex<ResolutionState>,
    /// Serializes resolution so concurrent callers see one listing
    resolving: tokio::sync::Mutex<()>,
}

impl RemoteItem {
    fn with_state(
        id: ItemId,
        name: String,
        content_type: String,
        size: u64,
        state: ResolutionState,
    ) -> Self {
        Self {
            id,
            name,
            content_type,
            size,
            modified: None,
            shared: false,
            binary_url: None,
            state: Mutex::new(state),
            resolving: tokio::sync::Mutex::new(()),
        }
    }

    /// A document or binary file
    pub fn file(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self::with_state(
            id.into(),
            name.into(),
            content_type.into(),
            size,
            ResolutionState::Resolved(Vec::new()),
        )
    }

    /// A folder whose children are listed on first resolution
    pub fn folder(id: impl Into<ItemId>, name: impl Into<String>) -> Self {
        let id = id.into();
        let query = Query::children_of(&id);
        Self::with_state(
            id,
            name.into(),
            FOLDER_TYPE.to_string(),
            0,
            ResolutionState::Unresolved(query),
        )
    }

    /// A synthetic root listed by an arbitrary query
    pub fn query_root(name: impl Into<String>, query: Query) -> Self {
        Self::with_state(
            ItemId::from(ROOT_ID),
            name.into(),
            ROOT_TYPE.to_string(),
            0,
            ResolutionState::Unresolved(query),
        )
    }

    /// Node for a listing entry; folders stay lazy
    pub fn from_entry(entry: RemoteEntry) -> Self {
        let id = ItemId::from(entry.id);
        let state = if is_folder_type(&entry.content_type) {
            ResolutionState::Unresolved(Query::children_of(&id))
        } else {
            ResolutionState::Resolved(Vec::new())
        };
        let mut item = Self::with_state(id, entry.name, entry.content_type, entry.size, state);
        item.modified = entry.modified;
        item.shared = entry.shared;
        item.binary_url = entry.binary_url;
        item
    }

    /// Set the modification time
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Set the shared flag
    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Set the binary fallback URL
    pub fn with_binary_url(mut self, url: impl Into<String>) -> Self {
        self.binary_url = Some(url.into());
        self
    }

    /// Mark a folder resolved with the given children (ignored for files)
    pub fn with_children(self, mut children: Vec<Arc<RemoteItem>>) -> Self {
        if !self.is_folder() {
            tracing::warn!(item_id = %self.id, "Ignoring children given to a non-folder item");
            return self;
        }
        sort_children(&mut children);
        *self.lock_state() = ResolutionState::Resolved(children);
        self
    }

    /// Whether this node is a folder (real or synthetic root)
    pub fn is_folder(&self) -> bool {
        is_folder_type(&self.content_type)
    }

    /// Whether the children are known (true for files and empty folders)
    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock_state(), ResolutionState::Resolved(_))
    }

    /// Whether listing this folder failed
    pub fn is_error(&self) -> bool {
        matches!(*self.lock_state(), ResolutionState::Error(_))
    }

    /// A copy of the current resolution state
    pub fn state(&self) -> ResolutionState {
        self.lock_state().clone()
    }

    /// Real children; empty unless resolved
    pub fn children(&self) -> Vec<Arc<RemoteItem>> {
        match &*self.lock_state() {
            ResolutionState::Resolved(children) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Children as a presentation layer shows them, placeholders included
    pub fn children_view(&self) -> Vec<ChildView> {
        if !self.is_folder() {
            return Vec::new();
        }
        match &*self.lock_state() {
            ResolutionState::Unresolved(_) => vec![ChildView::Placeholder(Placeholder::Loading)],
            ResolutionState::Error(_) => vec![ChildView::Placeholder(Placeholder::Error)],
            ResolutionState::Resolved(children) if children.is_empty() => {
                vec![ChildView::Placeholder(Placeholder::Empty)]
            }
            ResolutionState::Resolved(children) => {
                children.iter().cloned().map(ChildView::Item).collect()
            }
        }
    }

    /// Insert a child into a resolved folder, keeping the order
    pub fn add_child(&self, child: Arc<RemoteItem>) -> Result<()> {
        if !self.is_folder() {
            return Err(Error::NotAFolder(self.name.clone()));
        }
        match &mut *self.lock_state() {
            ResolutionState::Resolved(children) => {
                children.push(child);
                sort_children(children);
                Ok(())
            }
            _ => Err(Error::Other(format!(
                "cannot add a child to unresolved folder '{}'",
                self.name
            ))),
        }
    }

    /// Remove a child by id
    pub fn remove_child(&self, id: &ItemId) -> Option<Arc<RemoteItem>> {
        match &mut *self.lock_state() {
            ResolutionState::Resolved(children) => {
                let idx = children.iter().position(|c| &c.id == id)?;
                Some(children.remove(idx))
            }
            _ => None,
        }
    }

    /// List this folder's children, once
    ///
    /// The first call runs the stored query (retrying transient failures)
    /// and settles the state. Later calls return the settled children without
    /// a remote call; an `Error` node yields no children. Concurrent callers
    /// wait for the first one and share its result.
    pub async fn resolve(
        &self,
        clients: &ClientPool,
        retry: &RetryConfig,
    ) -> Result<Vec<Arc<RemoteItem>>> {
        let _gate = self.resolving.lock().await;

        let query = match &*self.lock_state() {
            ResolutionState::Resolved(children) => return Ok(children.clone()),
            ResolutionState::Error(_) => return Ok(Vec::new()),
            ResolutionState::Unresolved(query) => query.clone(),
        };

        let outcome = fetch_children(&query, clients, retry).await;

        {
            let mut state = self.lock_state();
            let previous = std::mem::replace(&mut *state, ResolutionState::Error(String::new()));
            *state = previous.complete(outcome.as_ref().cloned().map_err(|e| e.to_string()));
        }

        match outcome {
            Ok(children) => {
                tracing::debug!(item_id = %self.id, name = %self.name, children = children.len(), "Folder resolved");
                Ok(self.children())
            }
            Err(e) => {
                tracing::warn!(item_id = %self.id, name = %self.name, error = %e, "Folder listing failed");
                Err(e)
            }
        }
    }

    /// Bytes of all files reachable through resolved folders
    ///
    /// Unresolved folders contribute nothing until they are listed.
    pub fn known_bytes(&self) -> u64 {
        if !self.is_folder() {
            return self.size;
        }
        self.children().iter().map(|child| child.known_bytes()).sum()
    }

    fn lock_state(&self) -> MutexGuard<'_, ResolutionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Folders first, then case-insensitive name
pub fn sort_children(children: &mut [Arc<RemoteItem>]) {
    children.sort_by_cached_key(|child| (!child.is_folder(), child.name.to_lowercase()));
}

/// Run a query to completion, following page tokens
pub async fn list_all(
    query: &Query,
    clients: &ClientPool,
    retry: &RetryConfig,
) -> Result<Vec<RemoteEntry>> {
    let mut entries = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page_token = token.as_deref();
        let page = with_retry(retry, || async move {
            let mut client = clients.checkout()?;
            client.list(query, page_token).await
        })
        .await?;

        entries.extend(page.entries);
        match page.next_page_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }

    Ok(entries)
}

async fn fetch_children(
    query: &Query,
    clients: &ClientPool,
    retry: &RetryConfig,
) -> Result<Vec<Arc<RemoteItem>>> {
    let entries = list_all(query, clients, retry).await?;
    Ok(match query.shape {
        QueryShape::Children => entries
            .into_iter()
            .map(|entry| Arc::new(RemoteItem::from_entry(entry)))
            .collect(),
        QueryShape::Flattened => builder::attach_flat(entries),
    })
}
