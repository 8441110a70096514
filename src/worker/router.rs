//! Request routing
//!
//! Every intercepted request either passes through untouched or maps to
//! exactly one strategy and cache name.

use reqwest::Method;
use serde::Serialize;

use super::WorkerConfig;
use super::strategy::Strategy;
use crate::net::{Destination, Request};

/// Path suffixes served cache-first from the precache
pub const STATIC_EXTENSIONS: [&str; 12] = [
    "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "woff", "woff2", "ttf", "css", "js",
];

/// Why a request was left to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassthroughReason {
    NonGet,
    CrossOrigin,
    /// The worker does not control the page yet
    NotControlling,
}

/// Routing decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Passthrough(PassthroughReason),
    Handle { strategy: Strategy, cache_name: String },
}

/// Classify a request.
pub fn route(request: &Request, config: &WorkerConfig) -> Route {
    if request.method != Method::GET {
        return Route::Passthrough(PassthroughReason::NonGet);
    }

    if request.url.origin() != config.origin.origin() && !is_font_host(request, config) {
        return Route::Passthrough(PassthroughReason::CrossOrigin);
    }

    let path = request.url.path();

    let (strategy, cache_name) = if request.destination.is_static_asset() || has_static_extension(path)
    {
        (Strategy::CacheFirst, &config.precache_name)
    } else if request.destination == Destination::Document || request.accepts_html() {
        (Strategy::NetworkFirst, &config.runtime_cache_name)
    } else if path.starts_with(&config.api_prefix) {
        (Strategy::NetworkFirst, &config.runtime_cache_name)
    } else {
        (Strategy::StaleWhileRevalidate, &config.runtime_cache_name)
    };

    Route::Handle {
        strategy,
        cache_name: cache_name.clone(),
    }
}

fn is_font_host(request: &Request, config: &WorkerConfig) -> bool {
    request
        .url
        .host_str()
        .is_some_and(|host| host.contains(&config.font_host_marker))
}

/// Whether the last path segment ends in a static asset extension
pub fn has_static_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .is_some_and(|(_, ext)| STATIC_EXTENSIONS.contains(&ext))
}
