//! Incremental prerender cache.
//!
//! One JSON file per page. An entry is valid while the hash of the page source and
//! the bridge signature it was rendered against still matches.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

use crate::error::CrafterError;

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub html: String,
}

pub struct IncrementalCache {
    cache_dir: PathBuf,
}

impl IncrementalCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, CrafterError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|e| CrafterError::io(&cache_dir, e))?;
        Ok(Self { cache_dir })
    }

    pub fn compute_hash(source: &str, signature: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(signature.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Flattened page path plus a short hash of the original, so `a/b.html` and
    /// `a_b.html` never share a file.
    fn get_cache_path(&self, page: &str) -> PathBuf {
        let safe_name = page.replace(['/', '\\', ':'], "_");
        let digest = format!("{:x}", Sha256::digest(page.as_bytes()));
        self.cache_dir
            .join(format!("{}-{}.json", safe_name, &digest[..12]))
    }

    /// Rendered markup for `page`, if cached against the same source and signature.
    pub fn get(&self, page: &str, source: &str, signature: &str) -> Option<String> {
        let cache_path = self.get_cache_path(page);
        let data = fs::read_to_string(&cache_path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(page, error = %e, "discarding corrupt cache entry");
                fs::remove_file(&cache_path).ok();
                return None;
            }
        };

        if entry.hash == Self::compute_hash(source, signature) {
            Some(entry.html)
        } else {
            None
        }
    }

    pub fn set(&self, page: &str, source: &str, signature: &str, html: &str) -> Result<(), CrafterError> {
        let cache_path = self.get_cache_path(page);
        let entry = CacheEntry {
            hash: Self::compute_hash(source, signature),
            html: html.to_string(),
        };
        let data =
            serde_json::to_string(&entry).map_err(|e| CrafterError::Serialize(e.to_string()))?;
        fs::write(&cache_path, data).map_err(|e| CrafterError::io(&cache_path, e))
    }
}
