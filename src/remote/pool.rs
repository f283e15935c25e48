//! One client per worker: a small check-out/check-in pool of forked clients.

use super::RemoteClient;
use crate::error::RemoteError;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

struct PoolInner {
    /// Client every other instance is forked from; never handed out
    prototype: Mutex<Box<dyn RemoteClient>>,
    /// Clients returned by finished workers
    idle: Mutex<Vec<Box<dyn RemoteClient>>>,
    /// Number of clients forked so far
    forked: AtomicUsize,
}

/// Pool of remote clients, cloneable and shared across tasks
///
/// [`checkout`](Self::checkout) hands out an idle client or forks a new one
/// from the prototype. Dropping the returned [`PooledClient`] puts the client
/// back, so the pool never grows beyond the peak number of concurrent users.
#[derive(Clone)]
pub struct ClientPool {
    inner: Arc<PoolInner>,
}

impl ClientPool {
    /// Create a pool around a prototype client
    pub fn new(prototype: Box<dyn RemoteClient>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                prototype: Mutex::new(prototype),
                idle: Mutex::new(Vec::new()),
                forked: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out a client for exclusive use
    pub fn checkout(&self) -> Result<PooledClient, RemoteError> {
        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let client = match reused {
            Some(client) => client,
            None => {
                let prototype = self
                    .inner
                    .prototype
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let client = prototype.fork()?;
                let forked = self.inner.forked.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(forked, "Forked remote client");
                client
            }
        };

        Ok(PooledClient {
            client: Some(client),
            pool: self.inner.clone(),
        })
    }

    /// Clients currently waiting in the pool
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Clients forked over the pool's lifetime
    pub fn forked_count(&self) -> usize {
        self.inner.forked.load(Ordering::Relaxed)
    }
}

/// A checked-out client; returns to its pool on drop
pub struct PooledClient {
    client: Option<Box<dyn RemoteClient>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledClient {
    type Target = dyn RemoteClient;

    fn deref(&self) -> &Self::Target {
        match &self.client {
            Some(client) => client.as_ref(),
            None => unreachable!("client is only taken on drop"),
        }
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.client {
            Some(client) => client.as_mut(),
            None => unreachable!("client is only taken on drop"),
        }
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(client);
        }
    }
}
