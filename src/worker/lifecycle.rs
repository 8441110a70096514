//! Install/activate lifecycle
//!
//! Install precaches the manifest as one batch; activate deletes every cache
//! that is not part of the current version.

use std::fmt;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use reqwest::Url;
use serde::Serialize;

use crate::cache::CacheStore;
use crate::error::{CacheError, InstallError, LifecycleError};
use crate::net::{CacheMode, Fetcher, Request, Response};

/// Maximum manifest fetches in flight during install
const MAX_CONCURRENT_PRECACHE: usize = 6;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninstalled,
    Installing,
    /// Installed and waiting for activation
    Installed,
    Activating,
    Activated,
    /// Superseded by a newer version
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Lifecycle state machine
#[derive(Debug)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Uninstalled,
            skip_waiting: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Uninstalled → Installing
    pub fn begin_install(&mut self) -> Result<(), LifecycleError> {
        self.transition("install", &[WorkerState::Uninstalled], WorkerState::Installing)
    }

    /// Installing → Installed, or back to Uninstalled so the install can be retried
    pub fn finish_install(&mut self, succeeded: bool) {
        if self.state == WorkerState::Installing {
            self.state = if succeeded {
                WorkerState::Installed
            } else {
                WorkerState::Uninstalled
            };
        }
    }

    /// Request activation without waiting for the current controller to go away
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// True while installed but held back by another controlling version
    pub fn is_waiting(&self, has_controller: bool) -> bool {
        self.state == WorkerState::Installed && has_controller && !self.skip_waiting
    }

    /// Whether activation may proceed now
    pub fn can_activate(&self, has_controller: bool) -> bool {
        match self.state {
            WorkerState::Installed => !has_controller || self.skip_waiting,
            WorkerState::Activated => true,
            _ => false,
        }
    }

    /// Installed → Activating. An activated worker may re-run activation.
    ///
    /// Returns the state to restore if activation is abandoned.
    pub fn begin_activate(&mut self) -> Result<WorkerState, LifecycleError> {
        let previous = self.state;
        self.transition(
            "activate",
            &[WorkerState::Installed, WorkerState::Activated],
            WorkerState::Activating,
        )?;
        Ok(previous)
    }

    /// Activating → the state held before `begin_activate`
    pub fn abort_activate(&mut self, previous: WorkerState) {
        if self.state == WorkerState::Activating {
            self.state = previous;
        }
    }

    /// Activating → Activated
    pub fn finish_activate(&mut self) {
        if self.state == WorkerState::Activating {
            self.state = WorkerState::Activated;
        }
    }

    /// Mark as installed and waiting (restored from persisted state)
    pub fn restore_installed(&mut self) {
        self.state = WorkerState::Installed;
    }

    /// Mark as already active (restored from persisted controller state)
    pub fn restore_active(&mut self) {
        self.state = WorkerState::Activated;
    }

    /// Any state → Redundant
    pub fn supersede(&mut self) {
        self.state = WorkerState::Redundant;
    }

    fn transition(
        &mut self,
        action: &'static str,
        from: &[WorkerState],
        to: WorkerState,
    ) -> Result<(), LifecycleError> {
        if !from.contains(&self.state) {
            return Err(LifecycleError::InvalidTransition {
                action,
                state: self.state.to_string(),
            });
        }
        debug!("Worker {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }
}

/// Fetch every manifest URL, bypassing HTTP caches, and store them all.
///
/// Nothing is written unless every fetch returned a 2xx response.
/// Returns the number of entries stored.
pub async fn precache(
    store: &dyn CacheStore,
    fetcher: &dyn Fetcher,
    cache_name: &str,
    manifest: &[Url],
) -> Result<usize, InstallError> {
    store.open(cache_name).await?;
    info!("Precaching {} critical resources", manifest.len());

    let mut pending = manifest.iter().enumerate();
    let mut in_flight = FuturesUnordered::new();

    for (index, url) in pending.by_ref().take(MAX_CONCURRENT_PRECACHE) {
        in_flight.push(fetch_manifest_entry(fetcher, index, url));
    }

    let mut fetched = Vec::with_capacity(manifest.len());
    while let Some(result) = in_flight.next().await {
        fetched.push(result?);

        if let Some((index, url)) = pending.next() {
            in_flight.push(fetch_manifest_entry(fetcher, index, url));
        }
    }

    fetched.sort_by_key(|(index, _, _)| *index);
    for (_, request, response) in &fetched {
        store.put(cache_name, request, response).await?;
    }

    Ok(fetched.len())
}

async fn fetch_manifest_entry(
    fetcher: &dyn Fetcher,
    index: usize,
    url: &Url,
) -> Result<(usize, Request, Response), InstallError> {
    let request = Request::get(url.clone()).with_cache_mode(CacheMode::Reload);

    let response = fetcher
        .fetch(&request)
        .await
        .map_err(|source| InstallError::Fetch {
            url: url.to_string(),
            source,
        })?;

    if !response.is_ok() {
        return Err(InstallError::BadStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    debug!("Precached {}", url);
    Ok((index, request, response))
}

/// Delete every cache whose name is not in the allow-list.
///
/// Returns the deleted names. Running it again without new caches deletes nothing.
pub async fn delete_stale_caches(
    store: &dyn CacheStore,
    allow_list: &[String],
) -> Result<Vec<String>, CacheError> {
    let stale: Vec<String> = store
        .keys()
        .await?
        .into_iter()
        .filter(|name| !allow_list.contains(name))
        .collect();

    for name in &stale {
        info!("Deleting old cache: {}", name);
        store.delete(name).await?;
    }

    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::net::MockFetcher;

    fn urls(paths: &[&str]) -> Vec<Url> {
        paths
            .iter()
            .map(|p| Url::parse(&format!("https://studio.example{}", p)).unwrap())
            .collect()
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.state(), WorkerState::Uninstalled);

        lc.begin_install().unwrap();
        assert_eq!(lc.state(), WorkerState::Installing);
        lc.finish_install(true);
        assert_eq!(lc.state(), WorkerState::Installed);

        assert!(lc.can_activate(false));
        lc.begin_activate().unwrap();
        assert_eq!(lc.state(), WorkerState::Activating);
        lc.finish_activate();
        assert_eq!(lc.state(), WorkerState::Activated);

        lc.supersede();
        assert_eq!(lc.state(), WorkerState::Redundant);
    }

    #[test]
    fn test_failed_install_is_retryable() {
        let mut lc = Lifecycle::new();
        lc.begin_install().unwrap();
        lc.finish_install(false);
        assert_eq!(lc.state(), WorkerState::Uninstalled);
        assert!(lc.begin_install().is_ok());
    }

    #[test]
    fn test_waits_while_controlled_until_skip_waiting() {
        let mut lc = Lifecycle::new();
        lc.begin_install().unwrap();
        lc.finish_install(true);

        assert!(lc.is_waiting(true));
        assert!(!lc.can_activate(true));

        lc.skip_waiting();
        assert!(!lc.is_waiting(true));
        assert!(lc.can_activate(true));
    }

    #[test]
    fn test_cannot_activate_before_install() {
        let mut lc = Lifecycle::new();
        assert!(!lc.can_activate(false));
        assert!(lc.begin_activate().is_err());
    }

    #[test]
    fn test_aborted_activation_restores_state() {
        let mut lc = Lifecycle::new();
        lc.begin_install().unwrap();
        lc.finish_install(true);

        let previous = lc.begin_activate().unwrap();
        assert_eq!(previous, WorkerState::Installed);
        lc.abort_activate(previous);
        assert_eq!(lc.state(), WorkerState::Installed);
    }

    #[test]
    fn test_activated_may_reactivate() {
        let mut lc = Lifecycle::new();
        lc.restore_active();
        assert!(lc.can_activate(true));
        lc.begin_activate().unwrap();
        lc.finish_activate();
        assert_eq!(lc.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_precache_stores_every_entry() {
        let manifest = urls(&["/", "/index.html", "/images/logo.png"]);
        let mut net = MockFetcher::new();
        for url in &manifest {
            net = net.with_response(url.as_str(), Response::new(200, url.path().to_string()));
        }
        let store = MemoryCacheStore::new();

        let stored = precache(&store, &net, "site-v1", &manifest).await.unwrap();
        assert_eq!(stored, 3);
        assert_eq!(store.len("site-v1").await, 3);

        let hit = store
            .match_request("site-v1", &Request::get(manifest[2].clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body_text(), "/images/logo.png");
    }

    #[tokio::test]
    async fn test_precache_is_all_or_nothing() {
        let manifest = urls(&["/", "/index.html", "/missing.png"]);
        let net = MockFetcher::new()
            .with_response("https://studio.example/", Response::new(200, "home"))
            .with_response("https://studio.example/index.html", Response::new(200, "index"))
            .with_response("https://studio.example/missing.png", Response::new(404, ""));
        let store = MemoryCacheStore::new();

        let err = precache(&store, &net, "site-v1", &manifest).await.unwrap_err();
        assert!(matches!(err, InstallError::BadStatus { status: 404, .. }));
        assert_eq!(store.len("site-v1").await, 0);
    }

    #[tokio::test]
    async fn test_precache_network_failure() {
        let manifest = urls(&["/"]);
        let net = MockFetcher::new();
        net.set_offline(true).await;
        let store = MemoryCacheStore::new();

        let err = precache(&store, &net, "site-v1", &manifest).await.unwrap_err();
        assert!(matches!(err, InstallError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_precache_more_entries_than_concurrency() {
        let paths: Vec<String> = (0..15).map(|i| format!("/img/{}.png", i)).collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let manifest = urls(&refs);
        let mut net = MockFetcher::new();
        for url in &manifest {
            net = net.with_response(url.as_str(), Response::new(200, "x"));
        }
        let store = MemoryCacheStore::new();

        let stored = precache(&store, &net, "site-v1", &manifest).await.unwrap();
        assert_eq!(stored, 15);
        assert_eq!(net.total_calls().await, 15);
    }

    #[tokio::test]
    async fn test_delete_stale_caches_exact() {
        let store = MemoryCacheStore::new();
        for name in ["v1", "v1-runtime", "stale-old"] {
            store.open(name).await.unwrap();
        }
        let allow = vec!["v1".to_string(), "v1-runtime".to_string()];

        let deleted = delete_stale_caches(&store, &allow).await.unwrap();
        assert_eq!(deleted, vec!["stale-old".to_string()]);

        let mut remaining = store.keys().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["v1".to_string(), "v1-runtime".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_stale_caches_idempotent() {
        let store = MemoryCacheStore::new();
        for name in ["v1", "v1-runtime", "stale-old", "older"] {
            store.open(name).await.unwrap();
        }
        let allow = vec!["v1".to_string(), "v1-runtime".to_string()];

        let first = delete_stale_caches(&store, &allow).await.unwrap();
        assert_eq!(first.len(), 2);

        let second = delete_stale_caches(&store, &allow).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.keys().await.unwrap().len(), 2);
    }
}
