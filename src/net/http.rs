//! reqwest-backed fetcher

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use reqwest::header::{CACHE_CONTROL, HeaderName, HeaderValue, PRAGMA};
use reqwest::{Client as HttpClient, StatusCode};

use super::{CacheMode, Fetcher, Request, Response};
use crate::error::NetworkError;

/// Overall per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pace once the origin has answered 429: 6 requests per second
const THROTTLED_PER_SECOND: u32 = 6;

/// Network fetcher over a shared reqwest client.
///
/// Throttling is reactive: requests go out unpaced until the origin answers
/// 429 Too Many Requests, after which they wait on a rate limiter.
pub struct HttpFetcher {
    http: HttpClient,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    throttled: AtomicBool,
}

impl HttpFetcher {
    /// Create a new fetcher
    pub fn new() -> Result<Self, NetworkError> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("sitecache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::Other(e.to_string()))?;

        let quota = Quota::per_second(NonZeroU32::new(THROTTLED_PER_SECOND).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http,
            limiter: RateLimiter::direct(quota),
            throttled: AtomicBool::new(false),
        })
    }

    /// Whether the origin has asked us to slow down
    pub fn is_throttled(&self) -> bool {
        self.throttled.load(Ordering::SeqCst)
    }

    fn throttle(&self) {
        let was_throttled = self.throttled.swap(true, Ordering::SeqCst);
        if !was_throttled {
            debug!("Origin returned 429, pacing requests");
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        if self.is_throttled() {
            self.limiter.until_ready().await;
        }

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
            builder = builder.header(name, value);
        }

        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        debug!("{} {}", request.method, request.url);
        let resp = builder.send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.throttle();
        }

        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = resp.bytes().await?.to_vec();

        Ok(Response {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
