//! Cache key generation using SHA-256 hashes

use reqwest::{Method, Url};
use sha2::{Digest, Sha256};

/// Generate a deterministic cache key for a request.
///
/// The key covers the method and the URL without its fragment, so
/// `/page#a` and `/page#b` share one entry. Query strings are significant.
pub fn request_key(method: &Method, url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(normalized.as_str().as_bytes());

    format!("{:x}", hasher.finalize())
}

/// File name for an entry body stored outside the database
pub fn blob_name(cache_name: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cache_name.as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    format!("{:x}.bin", hasher.finalize())
}
