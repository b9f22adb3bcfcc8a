use crate::error::Result;
use crate::index::source::SourceRecord;
use crate::index::types::LocationId;
use crate::store::Store;
use crate::utils::file_mtime;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::warn;

/// Name of the logical table holding id -> SourceRecord pairs
pub const SOURCES_TABLE: &str = "sources";

/// [`SourceRecord`]s keyed by [`LocationId`], with an LRU of decoded records.
///
/// With the cache enabled, its lock is held across the store access in both
/// `get` and `put`, so a cached record is never older than the stored one.
pub struct SourceTable<S> {
    store: S,
    cache: Option<Mutex<LruCache<LocationId, SourceRecord>>>,
}

impl<S: Store> SourceTable<S> {
    /// Wrap `store`; `cache_size` 0 disables the decoded-record cache
    pub fn new(store: S, cache_size: usize) -> Self {
        Self {
            store,
            cache: NonZeroUsize::new(cache_size).map(|n| Mutex::new(LruCache::new(n))),
        }
    }

    /// The record for `id`, if one is stored and readable.
    ///
    /// Unreadable or undecodable records are reported as absent, which sends
    /// the unit back through a full reindex.
    pub fn get(&self, id: LocationId) -> Option<SourceRecord> {
        let Some(cache) = &self.cache else {
            return self.load(id);
        };

        let mut cache = cache.lock();
        if let Some(record) = cache.get(&id) {
            return Some(record.clone());
        }
        let record = self.load(id)?;
        cache.put(id, record.clone());
        Some(record)
    }

    /// Store `record` under `id`, replacing any previous record
    pub fn put(&self, id: LocationId, record: &SourceRecord) -> Result<()> {
        let bytes = record.encode()?;
        let key = id.to_le_bytes();

        match &self.cache {
            Some(cache) => {
                let mut cache = cache.lock();
                self.store.set_value(&key, &bytes)?;
                cache.put(id, record.clone());
            }
            None => self.store.set_value(&key, &bytes)?,
        }
        Ok(())
    }

    fn load(&self, id: LocationId) -> Option<SourceRecord> {
        let bytes = match self.store.value(&id.to_le_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(%id, error = %e, "failed to read source record");
                return None;
            }
        };

        match SourceRecord::decode(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%id, error = %e, "ignoring undecodable source record");
                None
            }
        }
    }

    /// Check the record for `id` against the live filesystem.
    ///
    /// `primary` is the unit's source file. No record, or a primary file that
    /// cannot be stat'ed, means reindex.
    pub fn needs_reindex(&self, id: LocationId, primary: &Path) -> bool {
        let Some(record) = self.get(id) else {
            return true;
        };
        let Some(current) = file_mtime(primary) else {
            return true;
        };
        record.needs_reindex(current, file_mtime)
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        Ok(self.store.entries()?.len())
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::args::CompilerArgs;
    use crate::index::source::Dependencies;
    use crate::store::{MemoryStore, StoreResult};
    use std::fs;
    use std::sync::mpsc::{self, Sender};
    use std::sync::Arc;
    use std::time::Duration;

    fn record(mtime: u64) -> SourceRecord {
        SourceRecord::saved(
            CompilerArgs::new("cc", Path::new("a.c"), vec!["-c".into()]),
            mtime,
            Dependencies::new(),
        )
    }

    #[test]
    fn test_put_get() {
        let table = SourceTable::new(MemoryStore::new(), 4);
        let id = LocationId::new(3);

        assert_eq!(table.get(id), None);
        table.put(id, &record(10)).unwrap();
        assert_eq!(table.get(id), Some(record(10)));

        table.put(id, &record(11)).unwrap();
        assert_eq!(table.get(id), Some(record(11)));
        assert_eq!(table.count().unwrap(), 1);
    }

    #[test]
    fn test_uncached_reads_hit_store() {
        let store = Arc::new(MemoryStore::new());
        let writer = SourceTable::new(Arc::clone(&store), 0);
        writer.put(LocationId::new(1), &record(5)).unwrap();

        let reader = SourceTable::new(store, 0);
        assert_eq!(reader.get(LocationId::new(1)), Some(record(5)));
    }

    #[test]
    fn test_corrupt_record_reads_as_absent() {
        let store = MemoryStore::new();
        store.insert_raw(&LocationId::new(2).to_le_bytes(), &[1, 2, 3]);
        let table = SourceTable::new(store, 4);

        assert_eq!(table.get(LocationId::new(2)), None);
        assert!(table.needs_reindex(LocationId::new(2), Path::new("/does/not/matter.c")));
    }

    #[test]
    fn test_read_failure_reads_as_absent() {
        let store = Arc::new(MemoryStore::new());
        let table = SourceTable::new(Arc::clone(&store), 0);
        table.put(LocationId::new(1), &record(5)).unwrap();

        store.set_fail_reads(true);
        assert_eq!(table.get(LocationId::new(1)), None);
    }

    #[test]
    fn test_write_failure_propagates_and_keeps_old_record() {
        let store = Arc::new(MemoryStore::new());
        let table = SourceTable::new(Arc::clone(&store), 4);
        table.put(LocationId::new(1), &record(5)).unwrap();

        store.set_fail_writes(true);
        assert!(table.put(LocationId::new(1), &record(6)).is_err());
        assert_eq!(table.get(LocationId::new(1)), Some(record(5)));
    }

    #[test]
    fn test_needs_reindex_against_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.c");
        let header = dir.path().join("main.h");
        fs::write(&source, "int main() {}").unwrap();
        fs::write(&header, "#pragma once").unwrap();

        let table = SourceTable::new(MemoryStore::new(), 4);
        let id = LocationId::new(1);
        assert!(table.needs_reindex(id, &source));

        let deps: Dependencies = [(header.clone(), file_mtime(&header).unwrap())]
            .into_iter()
            .collect();
        let rec = SourceRecord::saved(
            CompilerArgs::new("cc", &source, vec![]),
            file_mtime(&source).unwrap(),
            deps,
        );
        table.put(id, &rec).unwrap();
        assert!(!table.needs_reindex(id, &source));

        fs::remove_file(&header).unwrap();
        assert!(table.needs_reindex(id, &source));

        assert!(table.needs_reindex(id, &dir.path().join("gone.c")));
    }

    /// Store whose reads pause after fetching the bytes, once armed
    struct SlowReads {
        inner: MemoryStore,
        fetched: Mutex<Option<Sender<()>>>,
    }

    impl Store for SlowReads {
        fn set_value(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
            self.inner.set_value(key, value)
        }

        fn value(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
            let bytes = self.inner.value(key)?;
            if let Some(tx) = self.fetched.lock().take() {
                let _ = tx.send(());
                std::thread::sleep(Duration::from_millis(50));
            }
            Ok(bytes)
        }

        fn entries(&self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
            self.inner.entries()
        }
    }

    #[test]
    fn test_put_during_read_is_not_shadowed_by_stale_cache() {
        let id = LocationId::new(1);
        let store = SlowReads {
            inner: MemoryStore::new(),
            fetched: Mutex::new(None),
        };
        store.inner.set_value(&id.to_le_bytes(), &record(1).encode().unwrap()).unwrap();

        let (tx, rx) = mpsc::channel();
        *store.fetched.lock() = Some(tx);
        let table = SourceTable::new(store, 4);

        std::thread::scope(|s| {
            let reader = s.spawn(|| table.get(id));
            rx.recv().unwrap();
            table.put(id, &record(2)).unwrap();
            assert_eq!(reader.join().unwrap(), Some(record(1)));
        });

        assert_eq!(table.get(id), Some(record(2)));
    }
}
