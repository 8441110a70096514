//! Request/response model and the network fetch seam

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpFetcher;
#[cfg(test)]
pub use mock::MockFetcher;

/// Status of the synthetic response served when neither cache nor network can answer
pub const OFFLINE_STATUS: u16 = 503;

/// Body of the synthetic offline response
pub const OFFLINE_BODY: &str = "Offline";

/// What kind of resource a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Font,
    Style,
    Script,
    /// fetch()/XHR and anything unclassified
    #[default]
    Empty,
}

impl Destination {
    /// Destinations served from the precache
    pub fn is_static_asset(&self) -> bool {
        matches!(
            self,
            Destination::Image | Destination::Font | Destination::Style | Destination::Script
        )
    }
}

/// How a fetch interacts with intermediate HTTP caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Bypass intermediate caches and revalidate with the origin
    Reload,
}

/// An intercepted request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    /// Header names are stored lowercase
    pub headers: BTreeMap<String, String>,
    pub cache_mode: CacheMode,
}

impl Request {
    /// A plain GET with no destination
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Empty,
            headers: BTreeMap::new(),
            cache_mode: CacheMode::Default,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Header lookup, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the request accepts an HTML response
    pub fn accepts_html(&self) -> bool {
        self.header("accept")
            .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// A response snapshot: what the caches store and what strategies return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// The synthetic response served when nothing else can answer
    pub fn offline() -> Self {
        Self::new(OFFLINE_STATUS, OFFLINE_BODY).with_header("content-type", "text/plain")
    }

    /// 2xx status
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_offline_fallback(&self) -> bool {
        self.status == OFFLINE_STATUS && self.body == OFFLINE_BODY.as_bytes()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network access trait; the worker never talks to reqwest directly
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a request from the network.
    ///
    /// Any HTTP status is a successful fetch; errors mean no response arrived.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
