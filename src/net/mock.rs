//! Mock fetcher for testing
//!
//! Serves scripted responses per URL without touching the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Fetcher, Request, Response};
use crate::error::NetworkError;

/// Mock network for strategy and lifecycle tests.
///
/// # Example
/// ```ignore
/// let net = MockFetcher::new()
///     .with_response("https://studio.example/", Response::new(200, "home"));
/// net.set_offline(true).await;
/// ```
#[derive(Clone, Default)]
pub struct MockFetcher {
    /// Responses keyed by full URL
    responses: Arc<Mutex<HashMap<String, Response>>>,
    /// Every fetch fails while set
    offline: Arc<Mutex<bool>>,
    /// Artificial latency applied before answering
    delay: Arc<Mutex<Option<Duration>>>,
    /// Fetch count per URL
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for a URL
    pub fn with_response(self, url: &str, response: Response) -> Self {
        self.responses
            .try_lock()
            .expect("mock not shared yet")
            .insert(url.to_string(), response);
        self
    }

    /// Add a response latency
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.try_lock().expect("mock not shared yet") = Some(delay);
        self
    }

    /// Replace the scripted response for a URL
    pub async fn set_response(&self, url: &str, response: Response) {
        self.responses
            .lock()
            .await
            .insert(url.to_string(), response);
    }

    /// Simulate losing (or regaining) connectivity
    pub async fn set_offline(&self, offline: bool) {
        *self.offline.lock().await = offline;
    }

    /// Number of fetches issued for a URL
    pub async fn calls(&self, url: &str) -> usize {
        self.calls.lock().await.get(url).copied().unwrap_or(0)
    }

    /// Total fetches issued
    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.to_string();
        *self.calls.lock().await.entry(url.clone()).or_insert(0) += 1;

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.offline.lock().await {
            return Err(NetworkError::Connect(format!("offline: {}", url)));
        }

        match self.responses.lock().await.get(&url) {
            Some(resp) => Ok(resp.clone()),
            None => Err(NetworkError::Other(format!("no mock response for {}", url))),
        }
    }
}
