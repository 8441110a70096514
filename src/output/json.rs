//! JSON output formatting
//!
//! Every JSON document printed by the CLI is wrapped in `{ data, meta }`.
//! Commands that run against a configured site also describe that site in
//! `meta.site`, so a saved document says which deploy version it came from.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Wrapper for JSON output with metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T> {
    pub data: T,
    pub meta: Metadata,
}

/// Metadata included in JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct Metadata {
    /// RFC 3339 time the document was produced
    pub generated_at: String,

    /// `sitecache <version>`
    pub generator: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteMeta>,
}

/// The deploy a document describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMeta {
    pub origin: String,
    pub version: String,
    pub precache: String,
    pub runtime_cache: String,
}

impl From<&Config> for SiteMeta {
    fn from(config: &Config) -> Self {
        Self {
            origin: config.origin.clone(),
            version: config.version.clone(),
            precache: config.precache_name(),
            runtime_cache: config.runtime_cache_name(),
        }
    }
}

impl<T> JsonOutput<T> {
    pub fn new(data: T, site: Option<SiteMeta>) -> Self {
        Self {
            data,
            meta: Metadata {
                generated_at: Utc::now().to_rfc3339(),
                generator: concat!("sitecache ", env!("CARGO_PKG_VERSION")).to_string(),
                site,
            },
        }
    }
}

/// Wrap and pretty-print data that is not tied to a site
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data, None))
}

/// Wrap and pretty-print data produced for the configured site
pub fn format_site_json<T: Serialize + ?Sized>(
    data: &T,
    config: &Config,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data, Some(SiteMeta::from(config))))
}
