//! Command execution context
//!
//! Loads the config, opens the cache store, and restores the worker to the
//! lifecycle state recorded by earlier runs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::Result;
use crate::net::HttpFetcher;
use crate::worker::ServiceWorker;

/// Metadata key holding the version that controls pages
pub const CONTROLLER_KEY: &str = "controller";

/// Metadata key holding the most recently installed version
pub const INSTALLED_KEY: &str = "installed";

/// Context for command execution: config, worker, and runtime options.
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub worker: Arc<ServiceWorker>,
    /// Network access for requests the worker leaves alone
    pub fetcher: Arc<HttpFetcher>,
    pub format: OutputFormat,
    /// `None` with `--no-cache`
    persistent: Option<Arc<SqliteCacheStore>>,
}

impl CommandContext {
    /// Create a new command context.
    ///
    /// # Errors
    /// Returns error if the config cannot be loaded or the cache store cannot be opened.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config_path = Config::resolve_path(opts.config_ref())?;
        let config = Config::load_from(&config_path)?;
        let worker_config = config.worker_config()?;

        let (store, persistent): (Arc<dyn CacheStore>, Option<Arc<SqliteCacheStore>>) =
            if opts.no_cache {
                log::debug!("Using in-memory cache store");
                (Arc::new(MemoryCacheStore::new()), None)
            } else {
                let sqlite = Arc::new(SqliteCacheStore::open_at(&config.cache_dir()?)?);
                (sqlite.clone(), Some(sqlite))
            };

        let fetcher = Arc::new(HttpFetcher::new()?);
        let worker = Arc::new(ServiceWorker::new(worker_config, store, fetcher.clone()));

        let ctx = Self {
            config,
            config_path,
            worker,
            fetcher,
            format: opts.format,
            persistent,
        };
        ctx.restore_worker_state()?;
        Ok(ctx)
    }

    /// The on-disk store, if one is in use
    pub fn persistent_store(&self) -> Option<&SqliteCacheStore> {
        self.persistent.as_deref()
    }

    /// Version currently controlling pages
    pub fn controller(&self) -> Result<Option<String>> {
        self.get_meta(CONTROLLER_KEY)
    }

    /// True if some other version controls pages
    pub fn has_other_controller(&self) -> Result<bool> {
        Ok(self
            .controller()?
            .is_some_and(|version| version != self.config.version))
    }

    /// Record the configured version as the controller
    pub fn set_controller(&self) -> Result<()> {
        self.set_meta(CONTROLLER_KEY, &self.config.version)
    }

    /// Record the configured version as installed
    pub fn set_installed(&self) -> Result<()> {
        self.set_meta(INSTALLED_KEY, &self.config.version)
    }

    fn restore_worker_state(&self) -> Result<()> {
        let version = Some(self.config.version.as_str());

        let controller = self.controller()?;

        if controller.as_deref() == version {
            self.worker.restore_active();
        } else if self.get_meta(INSTALLED_KEY)?.as_deref() == version {
            self.worker.restore_installed();
        }
        self.worker
            .set_other_controller(controller.is_some() && controller.as_deref() != version);
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        match &self.persistent {
            Some(store) => Ok(store.storage()?.get_meta(key)?),
            None => Ok(None),
        }
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        if let Some(store) = &self.persistent {
            store.storage()?.set_meta(key, value)?;
        }
        Ok(())
    }
}
