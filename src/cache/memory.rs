//! In-memory cache store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStore, request_key};
use crate::error::CacheError;
use crate::net::{Request, Response};

/// Cache store held entirely in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: RwLock<BTreeMap<String, HashMap<String, Response>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a cache (0 if it does not exist)
    pub async fn len(&self, cache_name: &str) -> usize {
        self.caches
            .read()
            .await
            .get(cache_name)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, cache_name: &str) -> Result<(), CacheError> {
        self.caches
            .write()
            .await
            .entry(cache_name.to_string())
            .or_default();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete(&self, cache_name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(cache_name).is_some())
    }

    async fn match_request(
        &self,
        cache_name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        let key = request_key(&request.method, &request.url);
        Ok(self
            .caches
            .read()
            .await
            .get(cache_name)
            .and_then(|cache| cache.get(&key))
            .cloned())
    }

    async fn put(
        &self,
        cache_name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), CacheError> {
        let key = request_key(&request.method, &request.url);
        self.caches
            .write()
            .await
            .entry(cache_name.to_string())
            .or_default()
            .insert(key, response.clone());
        Ok(())
    }
}
