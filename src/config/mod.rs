//! Configuration management for sitecache

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, ConfigError, Result};
use crate::worker::WorkerConfig;

/// Critical resources cached on install when no manifest is configured
pub const DEFAULT_PRECACHE: [&str; 6] = [
    "/",
    "/index.html",
    "/images/logo.png",
    "/favicons/favicon.ico",
    "/favicons/favicon-32x32.png",
    "/favicons/apple-touch-icon.png",
];

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Origin the worker serves (scheme, host and port)
    pub origin: String,

    /// Deploy version; part of every cache name
    #[serde(default = "default_version")]
    pub version: String,

    /// Prefix for cache names
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Paths fetched and stored at install time
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Same-origin path prefix routed network-first
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Cross-origin hosts containing this marker are treated as font servers
    #[serde(default = "default_font_host_marker")]
    pub font_host_marker: String,

    /// How long the foreground waits for a clear-cache acknowledgment
    #[serde(default = "default_clear_timeout_secs")]
    pub clear_timeout_secs: u64,

    /// Activate right after install even when another version controls
    #[serde(default)]
    pub skip_waiting: bool,

    /// Cache storage directory override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_cache_prefix() -> String {
    "site".to_string()
}

fn default_precache() -> Vec<String> {
    DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect()
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_font_host_marker() -> String {
    "fonts.".to_string()
}

fn default_clear_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Create a configuration for an origin with every other field defaulted
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            version: default_version(),
            cache_prefix: default_cache_prefix(),
            precache: default_precache(),
            api_prefix: default_api_prefix(),
            font_host_marker: default_font_host_marker(),
            clear_timeout_secs: default_clear_timeout_secs(),
            skip_waiting: false,
            cache_dir: None,
        }
    }

    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".sitecache").join("config.yaml"))
    }

    /// Resolve an optional override to a concrete config path
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration from an optional override path
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        Self::load_from(&Self::resolve_path(path)?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an optional override path
    pub fn save_at(&self, path: Option<&str>) -> Result<()> {
        self.save_to(&Self::resolve_path(path)?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // Set file permissions to 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Check the fields that cannot be defaulted
    pub fn validate(&self) -> Result<()> {
        let origin = self.origin_url()?;
        if origin.cannot_be_a_base() || origin.host_str().is_none() {
            return Err(ConfigError::Invalid(format!("origin has no host: {}", self.origin)).into());
        }
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("version must not be empty".to_string()).into());
        }
        if !self.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "api_prefix must start with '/': {}",
                self.api_prefix
            ))
            .into());
        }
        Ok(())
    }

    /// Parsed origin URL
    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid(format!("origin {}: {}", self.origin, e)).into())
    }

    /// Name of the versioned precache
    pub fn precache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Name of the versioned runtime cache
    pub fn runtime_cache_name(&self) -> String {
        format!("{}-runtime-{}", self.cache_prefix, self.version)
    }

    /// Bounded wait for the clear-cache acknowledgment
    pub fn clear_timeout(&self) -> Duration {
        Duration::from_secs(self.clear_timeout_secs)
    }

    /// Cache storage directory (~/.cache/sitecache on Linux unless overridden)
    pub fn cache_dir(&self) -> std::result::Result<PathBuf, CacheError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
                Ok(base.join("sitecache"))
            }
        }
    }

    /// Resolve the current-version worker configuration.
    ///
    /// Manifest paths are joined onto the origin, so relative and absolute
    /// entries are both accepted.
    pub fn worker_config(&self) -> Result<WorkerConfig> {
        self.validate()?;
        let origin = self.origin_url()?;

        let manifest = self
            .precache
            .iter()
            .map(|path| {
                origin.join(path).map_err(|e| {
                    ConfigError::Invalid(format!("precache entry {}: {}", path, e)).into()
                })
            })
            .collect::<Result<Vec<Url>>>()?;

        Ok(WorkerConfig {
            origin,
            version: self.version.clone(),
            precache_name: self.precache_name(),
            runtime_cache_name: self.runtime_cache_name(),
            manifest,
            api_prefix: self.api_prefix.clone(),
            font_host_marker: self.font_host_marker.clone(),
            skip_waiting: self.skip_waiting,
        })
    }
}
