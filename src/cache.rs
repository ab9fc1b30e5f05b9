//! Publish lookup cache
//!
//! Maps normalized asset paths to the last publish record fetched for them.
//! Writes are single-key upserts, so two workers racing on the same miss both
//! store an equivalent record and the last write wins.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::record::VersionRecord;

#[derive(Debug, Clone)]
struct CachedRecord {
    generation: u64,
    record: VersionRecord,
}

/// Concurrent path -> publish record cache
#[derive(Debug, Default)]
pub struct PublishCache {
    entries: DashMap<String, CachedRecord>,
    generation: AtomicU64,
}

impl PublishCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<VersionRecord> {
        let generation = self.generation();
        self.entries
            .get(path)
            .filter(|entry| entry.generation == generation)
            .map(|entry| entry.record.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn insert(&self, path: impl Into<String>, record: VersionRecord) {
        let generation = self.generation();
        self.entries.insert(path.into(), CachedRecord { generation, record });
    }

    /// Number of entries valid for the current generation
    pub fn len(&self) -> usize {
        let generation = self.generation();
        self.entries.iter().filter(|e| e.generation == generation).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Expire every entry by moving to a new generation
    pub fn invalidate(&self) -> u64 {
        let next = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.entries.retain(|_, entry| entry.generation >= next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::publish;
    use std::sync::Arc;

    #[test]
    fn test_insert_and_get() {
        let cache = PublishCache::new();
        assert!(cache.get("/p/a.exr").is_none());

        cache.insert("/p/a.exr", publish("a", 3, "/p/a.exr"));
        assert_eq!(cache.get("/p/a.exr").and_then(|r| r.version_number), Some(3));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_expires_entries() {
        let cache = PublishCache::new();
        cache.insert("/p/a.exr", publish("a", 1, "/p/a.exr"));

        assert_eq!(cache.invalidate(), 1);
        assert!(cache.is_empty());
        assert!(!cache.contains("/p/a.exr"));
    }

    #[test]
    fn test_concurrent_upserts_last_write_wins() {
        let cache = Arc::new(PublishCache::new());
        let handles: Vec<_> = (1..=8)
            .map(|v| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.insert("/p/shared.exr", publish("shared", v, "/p/shared.exr")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 1);
        let version = cache.get("/p/shared.exr").and_then(|r| r.version_number).unwrap();
        assert!((1..=8).contains(&version));
    }
}
