//! SQLite-based cache storage with file blob support
//!
//! Stores small bodies inline in SQLite, large bodies (>10KB) as files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::key::{blob_name, request_key};
use super::CacheStore;
use crate::error::CacheError;
use crate::net::{Request, Response};

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// Bodies larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 10 * 1024; // 10KB

type Result<T> = std::result::Result<T, CacheError>;

/// SQLite-backed storage for named caches
pub struct CacheStorage {
    conn: Connection,
    blobs_dir: PathBuf,
}

impl CacheStorage {
    /// Open or create cache storage at a directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("cache.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS caches (
                name TEXT PRIMARY KEY NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB,
                blob_path TEXT,
                created_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (cache_name, cache_key)
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_cache ON cache_entries(cache_name);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn, blobs_dir })
    }

    /// Create a cache row if missing
    pub fn open_cache(&self, cache_name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
            params![cache_name, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Names of all caches, oldest first
    pub fn cache_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM caches ORDER BY created_at, name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Look up a stored response
    pub fn get(&self, cache_name: &str, key: &str) -> Result<Option<Response>> {
        let row: Option<(u16, String, Option<Vec<u8>>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT status, headers, body, blob_path FROM cache_entries
                 WHERE cache_name = ?1 AND cache_key = ?2",
                params![cache_name, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((status, headers, body, blob_path)) = row else {
            return Ok(None);
        };

        let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
            .map_err(|e| CacheError::Corrupt(format!("headers for {}: {}", key, e)))?;

        let body = match (body, blob_path) {
            (Some(body), None) => body,
            (None, Some(blob_path)) => match std::fs::read(self.blobs_dir.join(&blob_path)) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Failed to read blob {}: {}", blob_path, e);
                    // Delete stale entry
                    let _ = self.conn.execute(
                        "DELETE FROM cache_entries WHERE cache_name = ?1 AND cache_key = ?2",
                        params![cache_name, key],
                    );
                    return Ok(None);
                }
            },
            _ => return Err(CacheError::Corrupt(format!("entry {} has no body", key))),
        };

        Ok(Some(Response {
            status,
            headers,
            body,
        }))
    }

    /// Store a response, replacing any previous entry for the same key
    pub fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()> {
        let key = request_key(&request.method, &request.url);
        let now = Utc::now().timestamp();
        let headers = serde_json::to_string(&response.headers)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;

        self.open_cache(cache_name)?;

        if response.body.len() <= INLINE_THRESHOLD {
            self.conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_name, cache_key, method, url, status, headers, body, blob_path, created_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
                params![
                    cache_name,
                    key,
                    request.method.as_str(),
                    request.url.as_str(),
                    response.status,
                    headers,
                    response.body,
                    now,
                    response.body.len()
                ],
            )?;
        } else {
            let blob_path = self.write_blob(cache_name, &key, &response.body)?;
            self.conn.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (cache_name, cache_key, method, url, status, headers, body, blob_path, created_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
                params![
                    cache_name,
                    key,
                    request.method.as_str(),
                    request.url.as_str(),
                    response.status,
                    headers,
                    blob_path,
                    now,
                    response.body.len()
                ],
            )?;
        }
        Ok(())
    }

    /// Delete a cache with its entries and blobs
    pub fn delete_cache(&self, cache_name: &str) -> Result<bool> {
        let blob_paths: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT blob_path FROM cache_entries
                 WHERE cache_name = ?1 AND blob_path IS NOT NULL",
            )?;
            let paths = stmt
                .query_map([cache_name], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            paths
        };

        for blob_path in blob_paths {
            if let Err(e) = std::fs::remove_file(self.blobs_dir.join(&blob_path)) {
                log::warn!("Failed to remove blob {}: {}", blob_path, e);
            }
        }

        self.conn
            .execute("DELETE FROM cache_entries WHERE cache_name = ?1", [cache_name])?;
        let deleted = self
            .conn
            .execute("DELETE FROM caches WHERE name = ?1", [cache_name])?;
        Ok(deleted > 0)
    }

    /// Per-cache entry counts and sizes
    pub fn summaries(&self) -> Result<Vec<CacheSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name, c.created_at, COUNT(e.cache_key), COALESCE(SUM(e.size_bytes), 0)
             FROM caches c LEFT JOIN cache_entries e ON e.cache_name = c.name
             GROUP BY c.name, c.created_at
             ORDER BY c.created_at, c.name",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(CacheSummary {
                    name: row.get(0)?,
                    created_at: row.get(1)?,
                    entries: row.get::<_, i64>(2)? as usize,
                    size_bytes: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// URLs stored in a cache, most recent first
    pub fn entry_urls(&self, cache_name: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT url FROM cache_entries WHERE cache_name = ?1
             ORDER BY created_at DESC, url",
        )?;
        let urls = stmt
            .query_map([cache_name], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let total_caches: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM caches", [], |r| r.get(0))?;

        let total_entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;

        let total_size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries",
            [],
            |r| r.get(0),
        )?;

        let (oldest, newest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM cache_entries",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(CacheStats {
            total_caches: total_caches as usize,
            total_entries: total_entries as usize,
            total_size_bytes: total_size as usize,
            oldest_entry: oldest,
            newest_entry: newest,
        })
    }

    /// Read a value from the metadata table
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |r| r.get(0))
            .optional()?)
    }

    /// Write a value to the metadata table
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Write a blob file, sharded by first 2 chars of its name
    fn write_blob(&self, cache_name: &str, key: &str, data: &[u8]) -> Result<String> {
        let filename = blob_name(cache_name, key);
        let shard = &filename[..2];
        let shard_dir = self.blobs_dir.join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create shard dir: {}", e)))?;

        let rel_path = format!("{}/{}", shard, filename);
        std::fs::write(shard_dir.join(&filename), data)
            .map_err(|e| CacheError::Io(format!("Failed to write blob: {}", e)))?;

        Ok(rel_path)
    }

    /// Nuke the cache (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

/// One row of the per-cache listing
#[derive(Debug, Clone)]
pub struct CacheSummary {
    pub name: String,
    pub created_at: i64,
    pub entries: usize,
    pub size_bytes: usize,
}

/// Statistics about cache state
#[derive(Debug)]
pub struct CacheStats {
    pub total_caches: usize,
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

/// [`CacheStore`] over [`CacheStorage`].
///
/// The connection is not `Sync`, so access is serialized through a mutex.
/// No lock is held across an await point.
pub struct SqliteCacheStore {
    storage: Mutex<CacheStorage>,
}

impl SqliteCacheStore {
    pub fn new(storage: CacheStorage) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }

    /// Open storage at a directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        Ok(Self::new(CacheStorage::open_at(cache_dir)?))
    }

    /// Direct access for statistics and metadata
    pub fn storage(&self) -> Result<MutexGuard<'_, CacheStorage>> {
        self.storage
            .lock()
            .map_err(|_| CacheError::Io("cache storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn open(&self, cache_name: &str) -> Result<()> {
        self.storage()?.open_cache(cache_name)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.storage()?.cache_names()
    }

    async fn delete(&self, cache_name: &str) -> Result<bool> {
        self.storage()?.delete_cache(cache_name)
    }

    async fn match_request(&self, cache_name: &str, request: &Request) -> Result<Option<Response>> {
        let key = request_key(&request.method, &request.url);
        self.storage()?.get(cache_name, &key)
    }

    async fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()> {
        self.storage()?.put(cache_name, request, response)
    }
}
