//! Service worker model
//!
//! Ties routing, strategies, the install/activate lifecycle and messaging
//! together behind the worker's event entry points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use reqwest::Url;
use serde::Serialize;

use crate::cache::CacheStore;
use crate::error::{CacheError, Result};
use crate::net::{Fetcher, Request, Response};

pub mod lifecycle;
pub mod messaging;
pub mod router;
pub mod strategy;

pub use lifecycle::{Lifecycle, WorkerState};
pub use messaging::{Command, Message, ServiceWorkerContainer, WorkerHandle, spawn_worker};
pub use router::{PassthroughReason, Route};
pub use strategy::{Strategy, StrategyEngine};

/// Background sync tag reserved for offline form replay
pub const SYNC_FORMS_TAG: &str = "sync-forms";

/// Resolved settings for one deployed version
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub origin: Url,
    pub version: String,
    pub precache_name: String,
    pub runtime_cache_name: String,
    /// Absolute URLs fetched at install
    pub manifest: Vec<Url>,
    pub api_prefix: String,
    /// Cross-origin hosts containing this are intercepted
    pub font_host_marker: String,
    pub skip_waiting: bool,
}

impl WorkerConfig {
    /// Caches that survive activation
    pub fn allow_list(&self) -> Vec<String> {
        vec![self.precache_name.clone(), self.runtime_cache_name.clone()]
    }
}

/// Result of a successful install
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    pub precached: usize,
    /// Set when the install activated straight away
    pub activation: Option<ActivateReport>,
}

/// Result of an activation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivateReport {
    /// Stale caches removed
    pub deleted: Vec<String>,
    pub claimed: bool,
}

/// What the worker did with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Left to the network
    Passthrough(PassthroughReason),
    Responded {
        strategy: Strategy,
        cache_name: String,
        response: Response,
    },
}

/// A service worker for one site version
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    engine: StrategyEngine,
    lifecycle: Mutex<Lifecycle>,
    clients_claimed: AtomicBool,
    /// Another version controls open pages
    other_controller: AtomicBool,
    last_activation: Mutex<Option<ActivateReport>>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let mut lifecycle = Lifecycle::new();
        if config.skip_waiting {
            lifecycle.skip_waiting();
        }

        Self {
            config: Arc::new(config),
            engine: StrategyEngine::new(Arc::clone(&store), Arc::clone(&fetcher)),
            store,
            fetcher,
            lifecycle: Mutex::new(lifecycle),
            clients_claimed: AtomicBool::new(false),
            other_controller: AtomicBool::new(false),
            last_activation: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle().state()
    }

    /// Whether open pages are controlled by this worker
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Record whether another version currently controls pages
    pub fn set_other_controller(&self, controlled: bool) {
        self.other_controller.store(controlled, Ordering::SeqCst);
    }

    pub fn has_other_controller(&self) -> bool {
        self.other_controller.load(Ordering::SeqCst)
    }

    /// Report of the most recent successful activation
    pub fn last_activation(&self) -> Option<ActivateReport> {
        self.last_activation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Precache the manifest, then activate unless another version controls
    /// pages and skip-waiting was not requested.
    ///
    /// On failure nothing is stored and the worker returns to `Uninstalled`.
    /// A failed activation leaves the worker installed and waiting.
    pub async fn install(&self) -> Result<InstallReport> {
        self.lifecycle().begin_install()?;
        info!("Installing {}", self.config.version);

        let result = lifecycle::precache(
            &*self.store,
            &*self.fetcher,
            &self.config.precache_name,
            &self.config.manifest,
        )
        .await;

        self.lifecycle().finish_install(result.is_ok());

        match result {
            Ok(precached) => {
                info!("Installed {} ({} entries)", self.config.version, precached);
                let activation = match self.activate_if_ready(self.has_other_controller()).await {
                    Ok(activation) => activation,
                    Err(e) => {
                        warn!("Activation after install failed: {}", e);
                        None
                    }
                };
                Ok(InstallReport {
                    cache_name: self.config.precache_name.clone(),
                    precached,
                    activation,
                })
            }
            Err(e) => {
                error!("Install failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Request activation without waiting for the current controller
    pub fn skip_waiting(&self) {
        self.lifecycle().skip_waiting();
    }

    /// True while installed but held back by a controlling version
    pub fn is_waiting(&self, has_controller: bool) -> bool {
        self.lifecycle().is_waiting(has_controller)
    }

    /// Delete stale caches and claim clients.
    ///
    /// Callers decide whether waiting rules allow this; see `activate_if_ready`.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let previous = self.lifecycle().begin_activate()?;
        info!("Activating {}", self.config.version);

        let deleted =
            match lifecycle::delete_stale_caches(&*self.store, &self.config.allow_list()).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    self.lifecycle().abort_activate(previous);
                    error!("Activation failed: {}", e);
                    return Err(e.into());
                }
            };

        self.lifecycle().finish_activate();
        self.clients_claimed.store(true, Ordering::SeqCst);
        self.other_controller.store(false, Ordering::SeqCst);
        info!("Activated {}", self.config.version);

        let report = ActivateReport {
            deleted,
            claimed: true,
        };
        *self
            .last_activation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report.clone());
        Ok(report)
    }

    /// Activate an installed worker unless it has to wait for another controller
    pub async fn activate_if_ready(&self, has_controller: bool) -> Result<Option<ActivateReport>> {
        let ready = {
            let lifecycle = self.lifecycle();
            lifecycle.state() == WorkerState::Installed && lifecycle.can_activate(has_controller)
        };

        if !ready {
            debug!("Activation deferred (state {})", self.state());
            return Ok(None);
        }

        self.activate().await.map(Some)
    }

    /// Mark this worker as installed by an earlier run
    pub fn restore_installed(&self) {
        self.lifecycle().restore_installed();
    }

    /// Mark this worker as the one already controlling pages
    pub fn restore_active(&self) {
        self.lifecycle().restore_active();
        self.clients_claimed.store(true, Ordering::SeqCst);
    }

    /// Retire this worker in favour of a newer version
    pub fn supersede(&self) {
        self.lifecycle().supersede();
        self.clients_claimed.store(false, Ordering::SeqCst);
        info!("Worker {} is redundant", self.config.version);
    }

    /// Intercept a request.
    ///
    /// Requests pass through until the worker is activated.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.state() != WorkerState::Activated {
            return FetchOutcome::Passthrough(PassthroughReason::NotControlling);
        }

        match router::route(request, &self.config) {
            Route::Passthrough(reason) => {
                debug!("Passthrough ({:?}): {} {}", reason, request.method, request.url);
                FetchOutcome::Passthrough(reason)
            }
            Route::Handle {
                strategy,
                cache_name,
            } => {
                debug!("{} ({}): {}", strategy, cache_name, request.url);
                let response = self.engine.handle(strategy, request, &cache_name).await;
                FetchOutcome::Responded {
                    strategy,
                    cache_name,
                    response,
                }
            }
        }
    }

    /// Handle a message posted from a page
    pub async fn handle_message(&self, message: Message) {
        let Message { data, port } = message;

        match data.parse::<Command>() {
            Ok(Command::SkipWaiting) => {
                self.skip_waiting();
                if self.state() == WorkerState::Installed
                    && let Err(e) = self.activate().await
                {
                    warn!("Skip-waiting activation failed: {}", e);
                }
            }
            Ok(Command::ClearCache) => {
                let state = self.state();
                let cleared = if state != WorkerState::Activated {
                    warn!("clearCache refused: worker is {}", state);
                    false
                } else {
                    match self.clear_all_caches().await {
                        Ok(deleted) => {
                            info!("Cleared {} caches", deleted.len());
                            true
                        }
                        Err(e) => {
                            error!("Failed to clear caches: {}", e);
                            false
                        }
                    }
                };

                match port {
                    Some(port) => {
                        if port.send(messaging::ClearCacheReply { cleared }).is_err() {
                            debug!("clearCache reply dropped; sender stopped waiting");
                        }
                    }
                    None => debug!("clearCache without a reply port"),
                }
            }
            Err(_) => debug!("Ignoring unknown message: {}", data),
        }
    }

    /// Handle a background sync event
    pub async fn handle_sync(&self, tag: &str) {
        if tag == SYNC_FORMS_TAG {
            // Form replay is not stored yet; nothing to flush
            debug!("Sync {}: nothing queued", tag);
        } else {
            debug!("Ignoring sync tag {}", tag);
        }
    }

    /// Delete every cache this origin owns
    pub async fn clear_all_caches(&self) -> std::result::Result<Vec<String>, CacheError> {
        let names = self.store.keys().await?;
        for name in &names {
            self.store.delete(name).await?;
        }
        Ok(names)
    }

    /// Wait for background revalidations to finish
    pub async fn settle(&self) {
        self.engine.settle().await;
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
