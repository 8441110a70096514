//! Cache strategies
//!
//! Each strategy maps (request, cache name) to a response and never fails:
//! network errors end in a cached entry or the synthetic offline response.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::net::{Fetcher, Request, Response};

/// How cached and network content take precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs strategies against an injected cache store and network.
///
/// Stale-while-revalidate refreshes are detached tokio tasks: they outlive
/// the engine and are only tracked so `settle()` can wait for them.
pub struct StrategyEngine {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    revalidations: Mutex<Vec<JoinHandle<()>>>,
}

impl StrategyEngine {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store,
            fetcher,
            revalidations: Mutex::new(Vec::new()),
        }
    }

    /// Dispatch to the named strategy
    pub async fn handle(&self, strategy: Strategy, request: &Request, cache_name: &str) -> Response {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request, cache_name).await,
            Strategy::NetworkFirst => self.network_first(request, cache_name).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, cache_name).await,
        }
    }

    /// Serve from cache; on a miss fetch, store ok responses, then return.
    pub async fn cache_first(&self, request: &Request, cache_name: &str) -> Response {
        if let Some(cached) = lookup(&*self.store, cache_name, request).await {
            debug!("Cache hit ({}): {}", cache_name, request.url);
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    write(&*self.store, cache_name, request, &response).await;
                }
                response
            }
            Err(e) => {
                debug!("Network failed for {}: {}", request.url, e);
                Response::offline()
            }
        }
    }

    /// Fetch and write through; on network failure serve the cached entry.
    pub async fn network_first(&self, request: &Request, cache_name: &str) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    write(&*self.store, cache_name, request, &response).await;
                }
                response
            }
            Err(e) => {
                debug!("Network failed for {}, trying cache: {}", request.url, e);
                lookup(&*self.store, cache_name, request)
                    .await
                    .unwrap_or_else(Response::offline)
            }
        }
    }

    /// Serve the cached entry at once and refresh it in the background.
    ///
    /// On a miss the refresh is awaited instead.
    pub async fn stale_while_revalidate(&self, request: &Request, cache_name: &str) -> Response {
        let cached = lookup(&*self.store, cache_name, request).await;

        let (tx, rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let background_request = request.clone();
        let background_cache = cache_name.to_string();
        self.spawn_revalidation(async move {
            let refreshed =
                revalidate(&*store, &*fetcher, &background_request, &background_cache).await;
            // The caller may have answered from cache already
            let _ = tx.send(refreshed);
        });

        if let Some(cached) = cached {
            debug!("Serving stale ({}): {}", cache_name, request.url);
            return cached;
        }

        match rx.await {
            Ok(Some(response)) => response,
            _ => Response::offline(),
        }
    }

    /// Wait for every outstanding background refresh
    pub async fn settle(&self) {
        let pending = std::mem::take(&mut *self.lock_revalidations());
        for handle in pending {
            if let Err(e) = handle.await {
                warn!("Revalidation task failed: {}", e);
            }
        }
    }

    /// Number of refreshes still running
    pub fn pending_revalidations(&self) -> usize {
        self.lock_revalidations()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    fn spawn_revalidation<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.lock_revalidations();
        handles.retain(|handle| !handle.is_finished());
        handles.push(tokio::spawn(task));
    }

    fn lock_revalidations(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.revalidations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cache read that degrades to a miss on storage errors
async fn lookup(store: &dyn CacheStore, cache_name: &str, request: &Request) -> Option<Response> {
    match store.match_request(cache_name, request).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!("Cache read failed ({}): {}", cache_name, e);
            None
        }
    }
}

/// Cache write that logs and drops storage errors
async fn write(store: &dyn CacheStore, cache_name: &str, request: &Request, response: &Response) {
    if let Err(e) = store.put(cache_name, request, response).await {
        warn!("Cache write failed ({}): {}", cache_name, e);
    }
}

/// Fetch and store an ok response; network failures are swallowed
async fn revalidate(
    store: &dyn CacheStore,
    fetcher: &dyn Fetcher,
    request: &Request,
    cache_name: &str,
) -> Option<Response> {
    match fetcher.fetch(request).await {
        Ok(response) => {
            if response.is_ok() {
                write(store, cache_name, request, &response).await;
            }
            Some(response)
        }
        Err(e) => {
            debug!("Revalidation failed for {}: {}", request.url, e);
            None
        }
    }
}
