// On-disk response cache keyed by exact source URL, organized as named
// caches under one root so whole generations can be evicted by name.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// A response stored for an exact source URL.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub url: String,
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    content_type: String,
}

/// Root handle over a directory of named caches.
///
/// Each named cache is a subdirectory holding an `index.json` (url → entry)
/// plus one blob file per entry. Entries never expire on their own; callers
/// delete whole caches by name.
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    /// Open (creating if needed) the cache root directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create cache root {}", root.display()))?;
        Ok(Self { root })
    }

    /// Open a named cache, creating it if absent.
    ///
    /// Each handle keeps its own in-memory index; open one handle per cache
    /// name per process and share it, or writes from a second handle may be
    /// lost when the first rewrites the index.
    pub fn open_cache(&self, name: &str) -> Result<UrlCache> {
        UrlCache::load(self.root.join(name))
    }

    /// Names of all caches currently on disk.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a named cache and everything in it. Returns `false` if the
    /// cache did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.root.join(name);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to delete cache {}", name))?;
        Ok(true)
    }
}

/// A single named cache keyed by exact source URL.
pub struct UrlCache {
    dir: PathBuf,
    index: RwLock<HashMap<String, IndexEntry>>,
}

impl UrlCache {
    fn load(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache dir {}", dir.display()))?;

        let index_path = dir.join("index.json");
        let index = if index_path.exists() {
            let raw = fs::read(&index_path)
                .with_context(|| format!("failed to read {}", index_path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("corrupt cache index {}", index_path.display()))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    /// Look up the response stored for `url`, if any.
    pub fn match_url(&self, url: &str) -> Result<Option<CachedResponse>> {
        let entry = {
            let index = self.index.read();
            match index.get(url) {
                Some(entry) => entry.clone(),
                None => return Ok(None),
            }
        };

        let path = self.dir.join(&entry.file);
        let body = fs::read(&path)
            .with_context(|| format!("failed to read cached blob {}", path.display()))?;
        Ok(Some(CachedResponse {
            url: url.to_string(),
            content_type: entry.content_type,
            body: Bytes::from(body),
        }))
    }

    /// True if an entry exists for `url` without reading its body.
    pub fn contains(&self, url: &str) -> bool {
        self.index.read().contains_key(url)
    }

    /// Store a response under `url`, replacing any previous entry.
    pub fn put(&self, url: &str, content_type: &str, body: &[u8]) -> Result<()> {
        let file = blob_file_name(url);
        let path = self.dir.join(&file);
        let tmp = self.dir.join(format!("{file}.tmp"));

        // Write-then-rename so a crash mid-write never leaves a truncated
        // blob behind an index entry.
        fs::write(&tmp, body)
            .with_context(|| format!("failed to write cache blob {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to commit cache blob {}", path.display()))?;

        let mut index = self.index.write();
        index.insert(
            url.to_string(),
            IndexEntry {
                file,
                content_type: content_type.to_string(),
            },
        );
        self.persist_index(&index)?;
        debug!("cached {} ({} bytes)", url, body.len());
        Ok(())
    }

    /// Number of entries currently indexed.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    fn persist_index(&self, index: &HashMap<String, IndexEntry>) -> Result<()> {
        let index_path = self.dir.join("index.json");
        let tmp = self.dir.join("index.json.tmp");
        let raw = serde_json::to_vec(index)?;
        fs::write(&tmp, raw)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &index_path)
            .with_context(|| format!("failed to commit {}", index_path.display()))?;
        Ok(())
    }
}

/// Blob file name for a URL: a truncated content-address of the URL itself,
/// safe for any filesystem.
fn blob_file_name(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    format!("{}.bin", hex::encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_file_name_stable() {
        let a = blob_file_name("https://example.com/a.wasm");
        let b = blob_file_name("https://example.com/a.wasm");
        let c = blob_file_name("https://example.com/b.wasm");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".bin"));
    }

    #[test]
    fn test_put_match_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::open(dir.path()).unwrap();
        let cache = storage.open_cache("test-cache").unwrap();

        assert!(cache.match_url("https://example.com/x").unwrap().is_none());

        cache
            .put("https://example.com/x", "application/wasm", b"payload")
            .unwrap();
        assert!(cache.contains("https://example.com/x"));

        let hit = cache.match_url("https://example.com/x").unwrap().unwrap();
        assert_eq!(hit.content_type, "application/wasm");
        assert_eq!(&hit.body[..], b"payload");
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::open(dir.path()).unwrap();
        {
            let cache = storage.open_cache("persist").unwrap();
            cache.put("https://example.com/y", "text/plain", b"hello").unwrap();
        }
        let cache = storage.open_cache("persist").unwrap();
        let hit = cache.match_url("https://example.com/y").unwrap().unwrap();
        assert_eq!(&hit.body[..], b"hello");
    }

    #[test]
    fn test_keys_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::open(dir.path()).unwrap();
        storage.open_cache("gen-a").unwrap();
        storage.open_cache("gen-b").unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["gen-a", "gen-b"]);
        assert!(storage.delete("gen-a").unwrap());
        assert!(!storage.delete("gen-a").unwrap());
        assert_eq!(storage.keys().unwrap(), vec!["gen-b"]);
    }
}
