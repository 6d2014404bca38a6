//! Stat-keyed config payload cache
//!
//! Entries are keyed by `(path, mtime_ns, size)`: touching or rewriting a
//! config file invalidates its entry on the next lookup without any watcher
//! machinery. The cache is a small LRU with an explicit [`PayloadCache::clear`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Compute the `"sha256-<hex>"` ETag (quoted, as served) over raw bytes.
pub fn compute_etag(raw: &[u8]) -> String {
    let digest = Sha256::digest(raw);
    format!("\"sha256-{}\"", hex_string(&digest))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A loaded config payload: the parsed record, the raw bytes it came from
/// and the ETag consumers hand to HTTP caching.
#[derive(Debug)]
pub struct Payload<T> {
    pub etag: String,
    pub parsed: Arc<T>,
    pub raw: Arc<Vec<u8>>,
}

impl<T> Clone for Payload<T> {
    fn clone(&self) -> Self {
        Self {
            etag: self.etag.clone(),
            parsed: self.parsed.clone(),
            raw: self.raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    path: PathBuf,
    mtime_ns: u128,
    size: u64,
}

/// A small LRU cache of config payloads keyed by file identity.
pub struct PayloadCache<T> {
    capacity: usize,
    entries: Mutex<VecDeque<(CacheKey, Payload<T>)>>,
}

impl<T> PayloadCache<T> {
    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn stat_key(path: &Path) -> Result<CacheKey> {
        let metadata = std::fs::metadata(path)
            .map_err(|_| Error::not_found(path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(Error::not_found(path.display().to_string()));
        }
        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(CacheKey {
            path: path.to_path_buf(),
            mtime_ns,
            size: metadata.len(),
        })
    }

    /// Fetch the payload for `path`, loading and parsing with `parse` when
    /// the file changed or was never seen.
    pub fn get_or_load(
        &self,
        path: &Path,
        parse: impl FnOnce(&[u8]) -> Result<T>,
    ) -> Result<Payload<T>> {
        let key = Self::stat_key(path)?;

        {
            let mut entries = self.entries.lock().expect("cache poisoned");
            if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
                let entry = entries.remove(pos).expect("present");
                let payload = entry.1.clone();
                entries.push_back(entry);
                return Ok(payload);
            }
        }

        let raw = std::fs::read(path)?;
        let etag = compute_etag(&raw);
        let parsed = parse(&raw)?;
        let payload = Payload {
            etag,
            parsed: Arc::new(parsed),
            raw: Arc::new(raw),
        };

        let mut entries = self.entries.lock().expect("cache poisoned");
        entries.push_back((key, payload.clone()));
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(payload)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.lock().expect("cache poisoned").clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_etag_format() {
        let etag = compute_etag(b"hello");
        assert!(etag.starts_with("\"sha256-"));
        assert!(etag.ends_with('"'));
        assert_eq!(etag.len(), 2 + 7 + 64 + 1);
        assert_eq!(compute_etag(b"hello"), etag);
        assert_ne!(compute_etag(b"other"), etag);
    }

    #[test]
    fn test_cache_hits_until_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "a: 1").unwrap();

        let cache: PayloadCache<String> = PayloadCache::new(4);
        let loads = AtomicUsize::new(0);
        let parse = |raw: &[u8]| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(String::from_utf8_lossy(raw).into_owned())
        };

        let first = cache.get_or_load(&path, parse).unwrap();
        let second = cache.get_or_load(&path, parse).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.etag, second.etag);

        // A content change (different size) invalidates the entry.
        std::fs::write(&path, "a: 22").unwrap();
        let third = cache.get_or_load(&path, parse).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_ne!(third.etag, first.etag);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let cache: PayloadCache<()> = PayloadCache::new(4);
        let err = cache
            .get_or_load(Path::new("/definitely/not/here.yaml"), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_clear_and_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let cache: PayloadCache<usize> = PayloadCache::new(2);
        for i in 0..3 {
            let path = dir.path().join(format!("c{i}.yaml"));
            std::fs::write(&path, format!("v: {i}")).unwrap();
            cache.get_or_load(&path, |_| Ok(i)).unwrap();
        }
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
