//! Named response caches
//!
//! The worker only sees the [`CacheStore`] trait. Two stores exist: SQLite with
//! file blob storage for large bodies, and an in-memory map for tests and
//! `--no-cache` runs.

pub mod key;
pub mod memory;
pub mod storage;

pub use key::request_key;
pub use memory::MemoryCacheStore;
pub use storage::{CacheStorage, SqliteCacheStore};

use async_trait::async_trait;

use crate::error::CacheError;
use crate::net::{Request, Response};

/// Platform cache storage: a set of named request → response caches.
///
/// Writes are idempotent and last-write-wins per request key, so concurrent
/// writers to the same key need no coordination beyond the store itself.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the named cache if it does not exist yet
    async fn open(&self, cache_name: &str) -> Result<(), CacheError>;

    /// Names of all existing caches
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a cache and all its entries; false if it did not exist
    async fn delete(&self, cache_name: &str) -> Result<bool, CacheError>;

    /// Look up the stored response for a request
    async fn match_request(
        &self,
        cache_name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError>;

    /// Store a response for a request, creating the cache if needed
    async fn put(
        &self,
        cache_name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), CacheError>;
}
