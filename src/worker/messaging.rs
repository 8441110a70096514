//! Messaging between pages and the worker
//!
//! Pages post string commands to the active worker. `clearCache` carries a
//! reply port; `skipWaiting` is fire-and-forget.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{ServiceWorker, WorkerState};
use crate::error::Result;

pub const SKIP_WAITING: &str = "skipWaiting";
pub const CLEAR_CACHE: &str = "clearCache";

/// Commands understood by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SkipWaiting,
    ClearCache,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            SKIP_WAITING => Ok(Command::SkipWaiting),
            CLEAR_CACHE => Ok(Command::ClearCache),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SkipWaiting => f.write_str(SKIP_WAITING),
            Command::ClearCache => f.write_str(CLEAR_CACHE),
        }
    }
}

/// Reply to `clearCache`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheReply {
    pub cleared: bool,
}

/// One-shot reply conduit
pub type ReplyPort = oneshot::Sender<ClearCacheReply>;

/// A posted message
#[derive(Debug)]
pub struct Message {
    pub data: String,
    pub port: Option<ReplyPort>,
}

impl Message {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            port: None,
        }
    }

    pub fn with_port(data: impl Into<String>, port: ReplyPort) -> Self {
        Self {
            data: data.into(),
            port: Some(port),
        }
    }
}

/// Page-side handle to a running worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl WorkerHandle {
    /// Post a message. False if the worker is gone.
    pub fn post_message(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    /// A handle whose messages land in the returned receiver
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Run the worker's message loop.
///
/// Each message is handled on its own task. The loop ends once every handle
/// has been dropped.
pub fn spawn_worker(worker: Arc<ServiceWorker>) -> (WorkerHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move {
                worker.handle_message(message).await;
            });
        }
        debug!("Worker message loop stopped");
    });

    (WorkerHandle { tx }, task)
}

/// Registration update check
#[async_trait]
pub trait UpdateCheck: Send + Sync {
    async fn update(&self) -> Result<()>;
}

#[async_trait]
impl UpdateCheck for ServiceWorker {
    /// Install the configured version if it is not installed yet; the
    /// install activates it when no other version controls pages
    async fn update(&self) -> Result<()> {
        if self.state() == WorkerState::Uninstalled {
            self.install().await?;
        }
        Ok(())
    }
}

/// Page-side view of the registered worker
pub struct ServiceWorkerContainer {
    active: Option<WorkerHandle>,
    registration: Option<Arc<dyn UpdateCheck>>,
    clear_timeout: Duration,
    reloading: AtomicBool,
    on_reload: Box<dyn Fn() + Send + Sync>,
}

impl ServiceWorkerContainer {
    pub fn new(clear_timeout: Duration) -> Self {
        Self {
            active: None,
            registration: None,
            clear_timeout,
            reloading: AtomicBool::new(false),
            on_reload: Box::new(|| {}),
        }
    }

    pub fn with_active(mut self, handle: WorkerHandle) -> Self {
        self.active = Some(handle);
        self
    }

    pub fn with_registration(mut self, registration: Arc<dyn UpdateCheck>) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Callback run when the controlling worker changes
    pub fn on_reload(mut self, reload: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reload = Box::new(reload);
        self
    }

    /// Ask the active worker to delete every cache.
    ///
    /// False without an active worker, on timeout, or if the worker dropped
    /// the reply port.
    pub async fn clear_cache(&self) -> bool {
        let Some(active) = &self.active else {
            warn!("No active service worker; nothing to clear");
            return false;
        };

        let (tx, rx) = oneshot::channel();
        if !active.post_message(Message::with_port(CLEAR_CACHE, tx)) {
            warn!("Service worker is not running");
            return false;
        }

        match tokio::time::timeout(self.clear_timeout, rx).await {
            Ok(Ok(reply)) => reply.cleared,
            Ok(Err(_)) => {
                warn!("Service worker closed the reply port");
                false
            }
            Err(_) => {
                warn!(
                    "Service worker did not answer within {:?}",
                    self.clear_timeout
                );
                false
            }
        }
    }

    /// Tell the active worker to stop waiting
    pub fn skip_waiting(&self) {
        if let Some(active) = &self.active
            && !active.post_message(Message::new(SKIP_WAITING))
        {
            debug!("skipWaiting not delivered");
        }
    }

    /// Run the registration's update check
    pub async fn update(&self) -> bool {
        let Some(registration) = &self.registration else {
            debug!("No registration to update");
            return false;
        };

        match registration.update().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Update check failed: {}", e);
                false
            }
        }
    }

    /// Controller changed: reload once. Returns true if this call reloaded.
    pub fn controller_changed(&self) -> bool {
        if self.reloading.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("New service worker took control; reloading");
        (self.on_reload)();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore};
    use crate::error::Error;
    use crate::net::{MockFetcher, Response};
    use crate::worker::WorkerConfig;
    use reqwest::Url;
    use std::sync::atomic::AtomicUsize;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn worker(store: &Arc<MemoryCacheStore>) -> Arc<ServiceWorker> {
        let origin = Url::parse("https://studio.example").unwrap();
        let config = WorkerConfig {
            manifest: vec![origin.join("/").unwrap()],
            origin,
            version: "v1".to_string(),
            precache_name: "site-v1".to_string(),
            runtime_cache_name: "site-runtime-v1".to_string(),
            api_prefix: "/api/".to_string(),
            font_host_marker: "fonts.".to_string(),
            skip_waiting: false,
        };
        let net =
            MockFetcher::new().with_response("https://studio.example/", Response::new(200, "home"));
        Arc::new(ServiceWorker::new(config, store.clone(), Arc::new(net)))
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!("skipWaiting".parse::<Command>(), Ok(Command::SkipWaiting));
        assert_eq!("clearCache".parse::<Command>(), Ok(Command::ClearCache));
        assert!("clearcache".parse::<Command>().is_err());
        assert_eq!(Command::ClearCache.to_string(), "clearCache");
    }

    #[test]
    fn test_reply_wire_format() {
        let json = serde_json::to_string(&ClearCacheReply { cleared: true }).unwrap();
        assert_eq!(json, r#"{"cleared":true}"#);
    }

    #[tokio::test]
    async fn test_clear_cache_without_worker() {
        let container = ServiceWorkerContainer::new(TIMEOUT);
        assert!(!container.clear_cache().await);
    }

    #[tokio::test]
    async fn test_clear_cache_round_trip() {
        let store = Arc::new(MemoryCacheStore::new());
        let sw = worker(&store);
        sw.install().await.unwrap();
        store.open("site-runtime-v1").await.unwrap();

        let (handle, _task) = spawn_worker(sw);
        let container = ServiceWorkerContainer::new(Duration::from_secs(5)).with_active(handle);

        assert!(container.clear_cache().await);
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cache_needs_activated_worker() {
        let store = Arc::new(MemoryCacheStore::new());
        store.open("site-v0").await.unwrap();
        let sw = worker(&store);

        let (handle, _task) = spawn_worker(sw.clone());
        let container = ServiceWorkerContainer::new(Duration::from_secs(5)).with_active(handle);

        assert!(!container.clear_cache().await);
        assert_eq!(sw.state(), WorkerState::Uninstalled);
        assert_eq!(store.keys().await.unwrap(), vec!["site-v0".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_cache_times_out() {
        let (handle, mut rx) = WorkerHandle::detached();
        let container = ServiceWorkerContainer::new(TIMEOUT).with_active(handle);

        // Hold the message without answering
        let silent = tokio::spawn(async move {
            let message = rx.recv().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(message);
        });

        assert!(!container.clear_cache().await);
        silent.abort();
    }

    #[tokio::test]
    async fn test_clear_cache_dropped_port() {
        let (handle, mut rx) = WorkerHandle::detached();
        let container = ServiceWorkerContainer::new(Duration::from_secs(5)).with_active(handle);

        tokio::spawn(async move {
            // Receive and drop without replying
            let _ = rx.recv().await;
        });

        assert!(!container.clear_cache().await);
    }

    #[tokio::test]
    async fn test_clear_cache_stopped_worker() {
        let (handle, rx) = WorkerHandle::detached();
        drop(rx);
        let container = ServiceWorkerContainer::new(TIMEOUT).with_active(handle);
        assert!(!container.clear_cache().await);
    }

    #[tokio::test]
    async fn test_skip_waiting_is_fire_and_forget() {
        let (handle, mut rx) = WorkerHandle::detached();
        let container = ServiceWorkerContainer::new(TIMEOUT).with_active(handle);

        container.skip_waiting();
        let message = rx.recv().await.unwrap();
        assert_eq!(message.data, SKIP_WAITING);
        assert!(message.port.is_none());
    }

    struct FailingUpdate;

    #[async_trait]
    impl UpdateCheck for FailingUpdate {
        async fn update(&self) -> Result<()> {
            Err(Error::Other("registration gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_update_outcomes() {
        let container = ServiceWorkerContainer::new(TIMEOUT);
        assert!(!container.update().await);

        let container = ServiceWorkerContainer::new(TIMEOUT).with_registration(Arc::new(FailingUpdate));
        assert!(!container.update().await);

        let store = Arc::new(MemoryCacheStore::new());
        let sw = worker(&store);
        let container = ServiceWorkerContainer::new(TIMEOUT).with_registration(sw.clone());
        assert!(container.update().await);
        assert_eq!(sw.state(), WorkerState::Activated);

        let store = Arc::new(MemoryCacheStore::new());
        let waiting = worker(&store);
        waiting.set_other_controller(true);
        let container = ServiceWorkerContainer::new(TIMEOUT).with_registration(waiting.clone());
        assert!(container.update().await);
        assert_eq!(waiting.state(), WorkerState::Installed);
    }

    #[test]
    fn test_controller_changed_reloads_once() {
        let reloads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reloads);
        let container = ServiceWorkerContainer::new(TIMEOUT).on_reload(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(container.controller_changed());
        assert!(!container.controller_changed());
        assert!(!container.controller_changed());
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }
}
